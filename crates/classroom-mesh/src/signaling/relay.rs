use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::SignalingChannel;

struct Member {
    inbound: mpsc::UnboundedSender<String>,
    forwarder: JoinHandle<()>,
    generation: u64,
}

#[derive(Default)]
struct RoomState {
    members: HashMap<String, Member>,
    next_generation: u64,
}

/// In-process room with the classroom relay's forwarding rules: every frame
/// a member sends is copied to every other member, whatever its `dest`.
#[derive(Clone, Default)]
pub struct LocalRelay {
    room: Arc<Mutex<RoomState>>,
}

impl LocalRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the room as `local_id`. A second join with the same id replaces
    /// the first member, whose channel then reports closure.
    pub fn join(&self, local_id: &str) -> SignalingChannel {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();

        let mut room = self.room.lock();
        room.next_generation += 1;
        let generation = room.next_generation;

        let forward_room = Arc::clone(&self.room);
        let sender_id = local_id.to_string();
        let forwarder = tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let room = forward_room.lock();
                for (id, member) in room.members.iter() {
                    if *id != sender_id {
                        let _ = member.inbound.send(frame.clone());
                    }
                }
            }
            let mut room = forward_room.lock();
            if room
                .members
                .get(&sender_id)
                .is_some_and(|member| member.generation == generation)
            {
                room.members.remove(&sender_id);
            }
        });

        if let Some(previous) = room.members.insert(
            local_id.to_string(),
            Member {
                inbound: in_tx,
                forwarder,
                generation,
            },
        ) {
            previous.forwarder.abort();
        }
        drop(room);

        tracing::debug!(target = "signaling", local_id = %local_id, "joined local relay");
        SignalingChannel::from_frames(local_id, out_tx, in_rx)
    }

    /// Drop a member's connection as if the relay had gone away for it.
    pub fn disconnect(&self, local_id: &str) -> bool {
        match self.room.lock().members.remove(local_id) {
            Some(member) => {
                member.forwarder.abort();
                true
            }
            None => false,
        }
    }

    pub fn members(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.room.lock().members.keys().cloned().collect();
        ids.sort();
        ids
    }
}
