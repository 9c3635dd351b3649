mod entry;
mod logger;
mod shutdown_handlers;

use pacekeeper::error::AppResult;

fn main() -> AppResult<()> {
    entry::run()
}
