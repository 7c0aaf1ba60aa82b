//! Command queue
//!
//! Total order over player commands. Commands run one at a time in arrival
//! order; command N+1 is handed out only after N settles. A high or critical
//! command discards pending commands of lower priority (their callers get
//! `Cancelled`) but never touches the running one. Instead, the running
//! command is told through the interrupt channel what the pending commands
//! want, and reacts at its next yield point.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::{oneshot, watch, Notify};
use tokio::time::Instant;
use tracing::debug;

use super::commands::Command;
use crate::crossfade::Interrupt;
use crate::error::{Error, Result};

/// Reply channel for a command's settlement
pub type Reply = oneshot::Sender<Result<()>>;

/// A command waiting for, or holding, the worker
#[derive(Debug)]
pub struct QueuedCommand {
    pub sequence: u64,
    pub command: Command,
    pub reply: Reply,
    pub enqueued_at: Instant,
}

#[derive(Debug, Default)]
struct QueueInner {
    pending: VecDeque<QueuedCommand>,
    running: Option<(u64, Command)>,
    next_sequence: u64,
    closed: bool,
}

impl QueueInner {
    /// Strongest interrupt wanted by anything waiting behind the running command
    fn wanted_interrupt(&self) -> Option<Interrupt> {
        if self.running.is_none() {
            return None;
        }
        self.pending
            .iter()
            .filter_map(|queued| queued.command.interrupt())
            .max()
    }
}

pub struct CommandQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
    depth: usize,
    interrupt: watch::Sender<Option<Interrupt>>,
}

impl CommandQueue {
    /// Queue holding at most `depth` pending commands
    pub fn new(depth: usize) -> Self {
        let (interrupt, _) = watch::channel(None);
        Self {
            inner: Mutex::new(QueueInner::default()),
            notify: Notify::new(),
            depth,
            interrupt,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_interrupt(&self, inner: &QueueInner) {
        let wanted = inner.wanted_interrupt();
        self.interrupt.send_if_modified(|current| {
            if *current == wanted {
                return false;
            }
            *current = wanted;
            true
        });
    }

    /// Receiver the running command watches for interrupts
    pub fn interrupts(&self) -> watch::Receiver<Option<Interrupt>> {
        self.interrupt.subscribe()
    }

    /// Number of commands waiting behind the running one
    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    /// Admit a command
    ///
    /// Returns its sequence number and the receiver of its settlement.
    pub fn submit(&self, command: Command) -> Result<(u64, oneshot::Receiver<Result<()>>)> {
        let mut inner = self.lock();

        if inner.closed {
            return Err(Error::Shutdown);
        }
        if matches!(command, Command::Start { .. }) && !inner.pending.is_empty() {
            return Err(Error::InvalidState(format!(
                "start requires an empty command queue ({} pending)",
                inner.pending.len()
            )));
        }

        let priority = command.priority();
        let mut kept = VecDeque::with_capacity(inner.pending.len());
        for queued in inner.pending.drain(..) {
            if queued.command.priority() < priority {
                debug!(
                    "Command #{} {} discarded by {}",
                    queued.sequence, queued.command, command
                );
                let _ = queued.reply.send(Err(Error::Cancelled(format!(
                    "{} superseded by {}",
                    queued.command, command
                ))));
            } else {
                kept.push_back(queued);
            }
        }
        inner.pending = kept;

        if inner.pending.len() >= self.depth {
            self.publish_interrupt(&inner);
            return Err(Error::QueueFull(self.depth));
        }

        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        let (reply, settled) = oneshot::channel();
        debug!("Command #{} {} queued", sequence, command);
        inner.pending.push_back(QueuedCommand {
            sequence,
            command,
            reply,
            enqueued_at: Instant::now(),
        });

        self.publish_interrupt(&inner);
        drop(inner);
        self.notify.notify_one();
        Ok((sequence, settled))
    }

    /// Wait for the next command
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn next(&self) -> Option<QueuedCommand> {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.lock();
                if let Some(queued) = inner.pending.pop_front() {
                    inner.running = Some((queued.sequence, queued.command.clone()));
                    self.publish_interrupt(&inner);
                    return Some(queued);
                }
                if inner.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Mark the running command as settled
    pub fn settle(&self, sequence: u64) {
        let mut inner = self.lock();
        if inner.running.as_ref().is_some_and(|(running, _)| *running == sequence) {
            inner.running = None;
        }
        self.publish_interrupt(&inner);
    }

    /// Refuse new commands and cancel everything pending
    pub fn close(&self) {
        let drained: Vec<QueuedCommand> = {
            let mut inner = self.lock();
            inner.closed = true;
            inner.pending.drain(..).collect()
        };

        for queued in drained {
            let _ = queued.reply.send(Err(Error::Cancelled(format!(
                "{} dropped at shutdown",
                queued.command
            ))));
        }
        self.notify.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lullaby_common::Direction;

    fn skip() -> Command {
        Command::Skip(Direction::Forward)
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = CommandQueue::new(3);
        queue.submit(Command::Start { fade_in: None }).unwrap();
        queue.submit(skip()).unwrap();

        let first = queue.next().await.unwrap();
        assert_eq!(first.command, Command::Start { fade_in: None });
        queue.settle(first.sequence);
        let second = queue.next().await.unwrap();
        assert_eq!(second.command, skip());
        assert!(second.sequence > first.sequence);
    }

    #[test]
    fn test_overflow_rejected() {
        let queue = CommandQueue::new(3);
        for _ in 0..3 {
            queue.submit(skip()).unwrap();
        }
        assert!(matches!(queue.submit(skip()), Err(Error::QueueFull(3))));
        assert_eq!(queue.len(), 3);
    }

    #[tokio::test]
    async fn test_high_priority_discards_pending_normal() {
        let queue = CommandQueue::new(3);
        let (_, first) = queue.submit(skip()).unwrap();
        let (_, second) = queue.submit(Command::TrackEnding).unwrap();
        queue.submit(Command::Pause).unwrap();

        assert!(matches!(first.await.unwrap(), Err(Error::Cancelled(_))));
        assert!(matches!(second.await.unwrap(), Err(Error::Cancelled(_))));
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_critical_discards_high() {
        let queue = CommandQueue::new(3);
        let (_, pause) = queue.submit(Command::Pause).unwrap();
        let (_, resume) = queue.submit(Command::Resume).unwrap();
        queue.submit(Command::Stop { fade_out: None }).unwrap();

        assert!(pause.await.unwrap().is_err());
        assert!(resume.await.unwrap().is_err());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_equal_priority_kept() {
        let queue = CommandQueue::new(3);
        queue.submit(Command::Pause).unwrap();
        queue.submit(Command::Resume).unwrap();
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_start_rejected_with_pending_commands() {
        let queue = CommandQueue::new(3);
        queue.submit(skip()).unwrap();
        let err = queue.submit(Command::Start { fade_in: None }).unwrap_err();
        assert!(err.is_invalid_state());
    }

    #[tokio::test]
    async fn test_interrupt_targets_running_command() {
        let queue = CommandQueue::new(3);
        let interrupts = queue.interrupts();

        queue.submit(skip()).unwrap();
        // Nothing is running yet
        assert_eq!(*interrupts.borrow(), None);

        let running = queue.next().await.unwrap();
        queue.submit(Command::Pause).unwrap();
        assert_eq!(*interrupts.borrow(), Some(Interrupt::Park));

        queue.submit(Command::Stop { fade_out: None }).unwrap();
        assert_eq!(*interrupts.borrow(), Some(Interrupt::Abort));

        queue.settle(running.sequence);
        assert_eq!(*interrupts.borrow(), None);

        // The stop now runs with nothing behind it
        let stop = queue.next().await.unwrap();
        assert_eq!(stop.command, Command::Stop { fade_out: None });
        assert_eq!(*interrupts.borrow(), None);
    }

    #[tokio::test]
    async fn test_close_cancels_pending_and_ends_stream() {
        let queue = CommandQueue::new(3);
        let (_, pending) = queue.submit(skip()).unwrap();

        queue.close();

        assert!(matches!(pending.await.unwrap(), Err(Error::Cancelled(_))));
        assert!(queue.next().await.is_none());
        assert!(matches!(queue.submit(Command::Pause), Err(Error::Shutdown)));
    }
}
