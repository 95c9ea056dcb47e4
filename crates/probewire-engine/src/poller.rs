//! Memory reads and the background poll scheduler.

use probewire_core::{Command, WatchEntry, WatchId, WatchRegistry, WatchValue};

use crate::error::EngineError;
use crate::events::DebugEvent;
use crate::executor::{Request, Submission};
use crate::session::Session;

impl Session {
    /// Read the current value of `entry` from the target.
    ///
    /// Refuses with [`EngineError::Busy`] while a command is in flight or
    /// frames are still waiting in the outbound queue.
    pub(crate) async fn read_memory(
        &self,
        entry: &WatchEntry,
        submission: Submission,
    ) -> Result<i64, EngineError> {
        self.require_active()?;
        if self.flags.command_in_progress() || !self.outbound.is_empty() {
            return Err(EngineError::Busy);
        }
        let command = Command::ReadMemory {
            address: entry.address,
            size: entry.size,
        };
        let message = self
            .execute(Request::read(&command, submission, self.options.attempts))
            .await?;
        Ok(self.decoder.decode_memory_value(&message, entry.data_type)?)
    }

    /// Read at most one watched entry.
    ///
    /// Picks the first pollable entry not yet read this cycle. Once every
    /// pollable entry has been read the cycle starts over.
    pub(crate) async fn poll_step(&self) {
        let Some((id, entry)) = self.next_unqueried().await else {
            return;
        };

        let value = match self.read_memory(&entry, Submission::Direct).await {
            Ok(v) => WatchValue::Value(v),
            Err(EngineError::Busy | EngineError::Inactive) => {
                tracing::debug!(entry = %entry.name, "engine busy, poll skipped");
                return;
            }
            Err(e) => {
                tracing::debug!(entry = %entry.name, error = %e, "poll read failed");
                WatchValue::Error
            }
        };

        let mut registry = self.registry.lock().await;
        let updated = match registry.get_mut(id) {
            Some(current) if current.is_pollable() => {
                current.queried = true;
                current.value = value;
                current.clone()
            }
            // Removed or taken into editing while the read was in flight.
            _ => return,
        };
        let cycle_done = registry
            .iter()
            .filter(|(_, e)| e.is_pollable())
            .all(|(_, e)| e.queried);
        if cycle_done {
            registry.iter_mut().for_each(|(_, e)| e.queried = false);
        }
        drop(registry);

        tracing::trace!(entry = %updated.name, value = %updated.value, "watch updated");
        // No subscribers is not an error.
        let _ = self.events.send(DebugEvent::WatchUpdated { id, entry: updated });
    }

    async fn next_unqueried(&self) -> Option<(WatchId, WatchEntry)> {
        let mut registry = self.registry.lock().await;
        if let Some(found) = first_unqueried(&registry) {
            return Some(found);
        }
        // An entry leaving the cycle for editing can close it without a read.
        if registry.iter().any(|(_, e)| e.is_pollable()) {
            registry.iter_mut().for_each(|(_, e)| e.queried = false);
        }
        first_unqueried(&registry)
    }
}

fn first_unqueried(registry: &WatchRegistry) -> Option<(WatchId, WatchEntry)> {
    registry
        .iter()
        .find(|(_, e)| e.is_pollable() && !e.queried)
        .map(|(id, e)| (id, e.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::fake::{fast_options, FakeTransport};
    use crate::session::Lifecycle;
    use probewire_core::{DataType, HexInterpreter};

    /// Answers `m<addr>,<size>` with the low address byte as the value.
    fn echo_address() -> Arc<FakeTransport> {
        FakeTransport::responding(|frame| {
            let body = probewire_core::frame::split(frame).map_or("", |(b, _)| b);
            let addr = body
                .strip_prefix('m')
                .and_then(|rest| rest.split(',').next())
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .unwrap_or(0);
            vec![format!("+${:02X}000000#00", addr & 0xFF)]
        })
    }

    fn polling_session(fake: Arc<FakeTransport>, entries: &[(&str, u32)]) -> (Session, Vec<WatchId>) {
        let mut registry = WatchRegistry::new();
        let ids = entries
            .iter()
            .map(|(name, addr)| registry.add(WatchEntry::new(*name, *addr, DataType::Uint32)))
            .collect();
        let session = Session::new(
            fake.clone(),
            Arc::new(HexInterpreter::new()),
            Arc::new(tokio::sync::Mutex::new(registry)),
            fast_options(),
        );
        fake.attach(session.inbound_tx.clone());
        session.set_lifecycle(Lifecycle::Active);
        (session, ids)
    }

    #[tokio::test(start_paused = true)]
    async fn step_reads_directly_without_touching_the_queue() {
        let fake = echo_address();
        let (session, ids) = polling_session(fake.clone(), &[("a", 0x10)]);
        let mut events = session.events.subscribe();

        session.poll_step().await;

        assert_eq!(fake.sent(), ["$m10,04#5E", "+"]);
        assert!(session.outbound.is_empty());
        match events.try_recv().unwrap() {
            DebugEvent::WatchUpdated { id, entry } => {
                assert_eq!(id, ids[0]);
                assert_eq!(entry.value, WatchValue::Value(0x10));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn full_cycle_reads_each_entry_once() {
        let fake = echo_address();
        let (session, _) = polling_session(fake.clone(), &[("a", 0x10), ("b", 0x20), ("c", 0x30)]);

        for _ in 0..6 {
            session.poll_step().await;
        }

        let reads: Vec<String> = fake.frames();
        assert_eq!(
            reads,
            ["$m10,04#5E", "$m20,04#5F", "$m30,04#60", "$m10,04#5E", "$m20,04#5F", "$m30,04#60"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn edited_and_unnamed_entries_are_skipped() {
        let fake = echo_address();
        let (session, ids) =
            polling_session(fake.clone(), &[("a", 0x10), ("", 0x20), ("c", 0x30)]);

        session.poll_step().await;
        session.registry.lock().await.get_mut(ids[2]).unwrap().edited = true;
        session.poll_step().await;
        session.poll_step().await;

        // cycle of {a} completes twice; the blank and edited entries never run
        assert_eq!(fake.frames(), ["$m10,04#5E", "$m10,04#5E", "$m10,04#5E"]);
        let registry = session.registry.lock().await;
        assert!(!registry.get(ids[2]).unwrap().queried);
        assert_eq!(registry.get(ids[2]).unwrap().value, WatchValue::Unread);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_read_stores_error_marker_and_advances() {
        let fake = FakeTransport::scripted(["+$ZZ#00"]);
        let (session, ids) = polling_session(fake.clone(), &[("a", 0x10), ("b", 0x20)]);

        session.poll_step().await;

        let registry = session.registry.lock().await;
        let a = registry.get(ids[0]).unwrap();
        assert_eq!(a.value, WatchValue::Error);
        assert!(a.queried);
        assert_eq!(a.value.to_string(), "#ERR");
    }

    #[tokio::test(start_paused = true)]
    async fn busy_engine_skips_step_without_marking() {
        let fake = echo_address();
        let (session, ids) = polling_session(fake.clone(), &[("a", 0x10)]);
        session.outbound.push("$?#3F".into());

        session.poll_step().await;

        assert!(fake.sent().is_empty());
        assert!(!session.registry.lock().await.get(ids[0]).unwrap().queried);
    }

    #[tokio::test(start_paused = true)]
    async fn detaching_session_skips_step_without_marking() {
        let fake = echo_address();
        let (session, ids) = polling_session(fake.clone(), &[("a", 0x10)]);
        assert!(session.begin_disconnect());

        session.poll_step().await;

        assert!(fake.sent().is_empty());
        let registry = session.registry.lock().await;
        assert_eq!(registry.get(ids[0]).unwrap().value, WatchValue::Unread);
    }

    #[tokio::test(start_paused = true)]
    async fn read_memory_requires_active_session() {
        let fake = echo_address();
        let (session, _) = polling_session(fake, &[]);
        session.set_lifecycle(Lifecycle::Disconnected);
        let entry = WatchEntry::new("a", 0x10, DataType::Uint8);
        assert!(matches!(
            session.read_memory(&entry, Submission::Direct).await,
            Err(EngineError::Inactive)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn read_memory_decodes_signed_types() {
        let fake = FakeTransport::scripted(["+$FEFF#00"]);
        let (session, _) = polling_session(fake.clone(), &[]);
        let entry = WatchEntry::new("delta", 0x2000, DataType::Int16);

        let value = session.read_memory(&entry, Submission::Direct).await.unwrap();
        assert_eq!(value, -2);
        assert_eq!(fake.sent(), ["$m2000,02#BD", "+"]);
    }
}
