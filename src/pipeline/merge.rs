use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, trace};

use crate::shutdown::CancelListener;

/// Fan-in of several streams.
#[derive(Debug)]
pub struct Merged<T> {
    pub output: mpsc::Receiver<T>,
    /// Completes once every input has been drained or cancellation fired,
    /// after which `output` is closed.
    pub handle: JoinHandle<()>,
}

/// Forwards every item of `inputs` onto one output stream.
///
/// Each input gets its own forwarder; the output closes only after all of
/// them have finished. Without cancellation nothing is lost or duplicated.
#[must_use]
pub fn merge<T>(cancel: &CancelListener, inputs: Vec<mpsc::Receiver<T>>, buffer: usize) -> Merged<T>
where
    T: Send + 'static,
{
    let (tx, output) = mpsc::channel(buffer.max(1));
    let mut forwarders = JoinSet::new();
    for (index, input) in inputs.into_iter().enumerate() {
        forwarders.spawn(forward(index, input, tx.clone(), cancel.clone()));
    }

    let handle = tokio::spawn(async move {
        while let Some(joined) = forwarders.join_next().await {
            if let Err(err) = joined {
                error!("Merge forwarder failed: {}", err);
            }
        }
        drop(tx);
    });

    Merged { output, handle }
}

async fn forward<T>(
    index: usize,
    mut input: mpsc::Receiver<T>,
    tx: mpsc::Sender<T>,
    mut cancel: CancelListener,
) -> u64 {
    let mut forwarded: u64 = 0;
    loop {
        let item = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            item = input.recv() => item,
        };
        let Some(item) = item else {
            break;
        };
        let sent = tokio::select! {
            biased;
            () = cancel.cancelled() => false,
            result = tx.send(item) => result.is_ok(),
        };
        if !sent {
            break;
        }
        forwarded = forwarded.saturating_add(1);
    }
    trace!(input = index, forwarded, "Merge input finished");
    forwarded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::CancelSignal;
    use std::collections::HashSet;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn merge_yields_every_item_once() -> Result<(), String> {
        let streams: u32 = 4;
        let per_stream: u32 = 25;
        let signal = CancelSignal::new();
        let mut inputs = Vec::new();
        let mut producers = Vec::new();
        for stream in 0..streams {
            let (tx, rx) = mpsc::channel(2);
            inputs.push(rx);
            producers.push(tokio::spawn(async move {
                for item in 0..per_stream {
                    let value = stream.saturating_mul(1_000).saturating_add(item);
                    if tx.send(value).await.is_err() {
                        return;
                    }
                }
            }));
        }

        let Merged { mut output, handle } = merge(&signal.listener(), inputs, 4);
        let mut seen = HashSet::new();
        let mut total: u32 = 0;
        while let Some(value) = timeout(Duration::from_secs(2), output.recv())
            .await
            .map_err(|err| format!("merge stalled: {}", err))?
        {
            total = total.saturating_add(1);
            if !seen.insert(value) {
                return Err(format!("Duplicate item {}", value));
            }
        }
        handle
            .await
            .map_err(|err| format!("merge join failed: {}", err))?;
        for producer in producers {
            producer
                .await
                .map_err(|err| format!("producer failed: {}", err))?;
        }

        let expected = streams.saturating_mul(per_stream);
        if total != expected {
            return Err(format!("Expected {} items, got {}", expected, total));
        }
        Ok(())
    }

    #[tokio::test]
    async fn merge_of_no_inputs_closes_immediately() -> Result<(), String> {
        let signal = CancelSignal::new();
        let Merged { mut output, handle } = merge::<u8>(&signal.listener(), Vec::new(), 1);
        let next = timeout(Duration::from_millis(500), output.recv())
            .await
            .map_err(|err| format!("output did not close: {}", err))?;
        if next.is_some() {
            return Err("Expected no items".to_owned());
        }
        handle
            .await
            .map_err(|err| format!("merge join failed: {}", err))
    }

    #[tokio::test]
    async fn cancel_closes_output_while_inputs_stay_open() -> Result<(), String> {
        let signal = CancelSignal::new();
        let (_held_tx, rx) = mpsc::channel::<u8>(1);
        let Merged { mut output, handle } = merge(&signal.listener(), vec![rx], 1);
        signal.fire();
        timeout(Duration::from_millis(500), handle)
            .await
            .map_err(|err| format!("merge did not stop: {}", err))?
            .map_err(|err| format!("merge join failed: {}", err))?;
        if output.recv().await.is_some() {
            return Err("Expected closed output after cancel".to_owned());
        }
        Ok(())
    }
}
