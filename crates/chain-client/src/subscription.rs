// Copyright (C) 2022-2024 Webb Technologies Inc.
//
// Tangle is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Tangle is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should receive a copy of the GNU General Public License
// If not, see <http://www.gnu.org/licenses/>.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Items buffered between the transport task and the consumer.
pub const SUBSCRIPTION_BUFFER: usize = 1024;

/// A live stream of chain items.
///
/// The items are produced by a background task that owns the transport,
/// dropping the handle stops that task.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::Receiver<crate::Result<T>>,
    task: Option<JoinHandle<()>>,
}

impl<T> Subscription<T> {
    /// A subscription fed through the returned sender.
    pub fn channel(buffer: usize) -> (mpsc::Sender<crate::Result<T>>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self { rx, task: None })
    }

    /// Ties the producing task to this handle.
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    /// The next item, `None` once the producer is gone.
    pub async fn next(&mut self) -> Option<crate::Result<T>> {
        self.rx.recv().await
    }

    /// Stops the producer.
    pub fn unsubscribe(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ends_when_the_sender_is_gone() {
        let (tx, mut sub) = Subscription::<u64>::channel(4);
        tx.send(Ok(1)).await.unwrap();
        drop(tx);
        assert_eq!(sub.next().await.unwrap().unwrap(), 1);
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn dropping_aborts_the_producer() {
        let (tx, sub) = Subscription::<u64>::channel(1);
        let task = tokio::spawn(async move {
            loop {
                if tx.send(Ok(0)).await.is_err() {
                    break;
                }
            }
        });
        let sub = sub.with_task(task);
        sub.unsubscribe();
    }
}
