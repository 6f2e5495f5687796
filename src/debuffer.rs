//! Decouples a fast producer from a slow consumer with an unbounded FIFO.

use std::collections::VecDeque;

use tokio::sync::mpsc::{self, Receiver, Sender};
use tracing::{trace, Instrument};

/// Forwards everything received on `input` to the returned receiver, in
/// arrival order, without ever letting `input` back up.
///
/// Values wait in an unbounded in-memory queue until the consumer takes
/// them; nothing bounds that queue. Once every sender of `input` is dropped,
/// the values already queued are delivered and then the output closes. If
/// the output receiver is dropped, forwarding stops and queued values are
/// discarded.
///
/// Must be called from within a Tokio runtime.
pub fn no_block<T: Send + 'static>(mut input: Receiver<T>) -> Receiver<T> {
  let (output_tx, output_rx) = mpsc::channel::<T>(1);

  tokio::spawn(
    async move {
      let mut pending: VecDeque<T> = VecDeque::new();
      let mut input_open = true;

      loop {
        if !input_open && pending.is_empty() {
          break;
        }

        tokio::select! {
          received = input.recv(), if input_open => match received {
            Some(value) => pending.push_back(value),
            None => {
              trace!(pending = pending.len(), "Debuffer input closed, flushing queued values.");
              input_open = false;
            }
          },
          permit = output_tx.reserve(), if !pending.is_empty() => match permit {
            Ok(permit) => {
              if let Some(value) = pending.pop_front() {
                permit.send(value);
              }
            }
            Err(_) => {
              trace!(dropped = pending.len(), "Debuffer output receiver dropped.");
              break;
            }
          },
        }
      }
    }
    .instrument(tracing::trace_span!("debuffer")),
  );

  output_rx
}

/// A channel whose sender only waits for the forwarding task, never for the
/// consumer. Shorthand for feeding a fresh channel through [`no_block`].
pub fn unbounded_handoff<T: Send + 'static>() -> (Sender<T>, Receiver<T>) {
  let (input_tx, input_rx) = mpsc::channel::<T>(1);
  (input_tx, no_block(input_rx))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  #[tokio::test]
  async fn test_producer_does_not_wait_for_consumer() {
    let (tx, mut rx) = unbounded_handoff::<u32>();

    // Nobody reads while these are sent.
    tokio::time::timeout(Duration::from_secs(1), async {
      for i in 0..1_000 {
        tx.send(i).await.unwrap();
      }
    })
    .await
    .expect("Producer blocked on an idle consumer.");

    for expected in 0..1_000 {
      assert_eq!(rx.recv().await, Some(expected));
    }
  }

  #[tokio::test]
  async fn test_closing_input_flushes_then_closes_output() {
    let (tx, mut rx) = unbounded_handoff::<&'static str>();
    tx.send("a").await.unwrap();
    tx.send("b").await.unwrap();
    drop(tx);

    assert_eq!(rx.recv().await, Some("a"));
    assert_eq!(rx.recv().await, Some("b"));
    assert_eq!(rx.recv().await, None);
  }

  #[tokio::test]
  async fn test_dropped_output_stops_forwarding() {
    let (tx, rx) = unbounded_handoff::<u32>();
    drop(rx);

    // The forwarder notices on its next attempt to deliver and exits,
    // which eventually closes the input.
    let _ = tx.send(1).await;
    let _ = tx.send(2).await;
    tokio::time::timeout(Duration::from_secs(1), tx.closed())
      .await
      .expect("Input should close once the forwarder stops.");
  }
}
