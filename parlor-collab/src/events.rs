use crossbeam::channel::{unbounded, Receiver, Sender};
use log::warn;

use crate::{
    GameData, GameParticipantData, GameSessionData, JoinRequestData, PrimaryKey, RoomPatch,
    RoomParticipantData, UserData,
};

pub type EventSender = Sender<PartyEvent>;
pub type EventReceiver = Receiver<PartyEvent>;

/// Why a user stopped being an active participant of a room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveReason {
    /// The user asked to leave
    Left,
    /// The user's last realtime connection dropped
    Disconnected,
}

/// Events emitted by the managers after a committed state change.
///
/// The realtime gateway drains these in order and fans them out, so per-room
/// delivery order matches commit order.
#[derive(Debug, Clone)]
pub enum PartyEvent {
    /// A room's attributes changed. Carries the applied patch.
    RoomUpdated {
        room_id: PrimaryKey,
        patch: RoomPatch,
    },
    /// A user became an active participant of a room
    UserJoinedRoom {
        room_id: PrimaryKey,
        participant: RoomParticipantData,
    },
    /// A user stopped being an active participant of a room
    UserLeftRoom {
        room_id: PrimaryKey,
        user_id: PrimaryKey,
        reason: LeaveReason,
    },
    /// Someone asked to join a locked room. Addressed to the host only.
    JoinRequestCreated {
        host_id: PrimaryKey,
        request: JoinRequestData,
    },
    /// A join request was accepted. Addressed to the requester only.
    JoinRequestAccepted {
        user_id: PrimaryKey,
        room_id: PrimaryKey,
        request_id: PrimaryKey,
    },
    /// A new game session started in a room
    GameSessionCreated {
        room_id: PrimaryKey,
        session: GameSessionData,
    },
    /// A user took a seat in a game session
    GamePlayerJoined {
        room_id: PrimaryKey,
        session_id: PrimaryKey,
        participant: GameParticipantData,
    },
    /// A user left a game session
    GamePlayerLeft {
        room_id: PrimaryKey,
        session_id: PrimaryKey,
        user_id: PrimaryKey,
    },
    /// A participant's score changed by `delta`, to a new total of `score`
    GameScoreUpdated {
        room_id: PrimaryKey,
        session_id: PrimaryKey,
        user_id: PrimaryKey,
        score: i32,
        delta: i32,
    },
    /// A game session reached a terminal state
    GameEnded {
        room_id: PrimaryKey,
        session_id: PrimaryKey,
        ended_by: PrimaryKey,
    },
    /// An invitation into a running game. Addressed to the invitee only.
    GameInvite {
        invitee_id: PrimaryKey,
        room_id: PrimaryKey,
        session_id: PrimaryKey,
        inviter: UserData,
        game: GameData,
    },
}

/// The event channel shared by all managers.
///
/// Sends never block, delivery is best-effort: a send failure is logged and
/// swallowed because the state change it describes has already committed.
#[derive(Debug, Clone)]
pub struct Events {
    sender: EventSender,
    receiver: EventReceiver,
}

impl Events {
    pub fn emit(&self, event: PartyEvent) {
        if self.sender.send(event).is_err() {
            warn!("Event channel is closed, dropping event");
        }
    }

    pub fn receiver(&self) -> EventReceiver {
        self.receiver.clone()
    }
}

impl Default for Events {
    fn default() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }
}
