// Routing of decoded client messages.
//
// `route` sorts a `ClientMessage` into either a control request (start a
// game) or a phase response (team, vote, sabotage). Phase responses never
// touch game state here: the orchestrator hands them to the response slots of
// the phase it is currently running, which decide whether they count.

use saboteur_protocol::{ClientMessage, Generation, PlayerId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    StartGame,
}

/// Payload of an answer to a phase request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PhaseResponse {
    Team(Vec<PlayerId>),
    Vote(bool),
    Sabotage(bool),
}

impl PhaseResponse {
    /// Wire kind of the message this came from, for rejection notices.
    pub fn kind(&self) -> &'static str {
        match self {
            PhaseResponse::Team(_) => "team-proposed",
            PhaseResponse::Vote(_) => "vote-cast",
            PhaseResponse::Sabotage(_) => "sabotage-choice",
        }
    }

    pub fn into_team(self) -> Result<Vec<PlayerId>, Self> {
        match self {
            PhaseResponse::Team(team) => Ok(team),
            other => Err(other),
        }
    }

    pub fn into_vote(self) -> Result<bool, Self> {
        match self {
            PhaseResponse::Vote(approve) => Ok(approve),
            other => Err(other),
        }
    }

    pub fn into_sabotage(self) -> Result<bool, Self> {
        match self {
            PhaseResponse::Sabotage(sabotage) => Ok(sabotage),
            other => Err(other),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Routed {
    Control(Control),
    Response {
        /// The `playerId` the client put in the message; checked against the
        /// connection it arrived on.
        claimed: PlayerId,
        generation: Generation,
        response: PhaseResponse,
    },
    /// Nothing for the orchestrator to do.
    Ignored,
}

pub fn route(message: ClientMessage) -> Routed {
    match message {
        ClientMessage::StartGame => Routed::Control(Control::StartGame),
        ClientMessage::TeamProposed {
            player_id,
            team,
            generation,
        } => Routed::Response {
            claimed: player_id,
            generation,
            response: PhaseResponse::Team(team),
        },
        ClientMessage::VoteCast {
            player_id,
            approve,
            generation,
        } => Routed::Response {
            claimed: player_id,
            generation,
            response: PhaseResponse::Vote(approve),
        },
        ClientMessage::SabotageChoice {
            player_id,
            sabotage,
            generation,
        } => Routed::Response {
            claimed: player_id,
            generation,
            response: PhaseResponse::Sabotage(sabotage),
        },
        // The reader turns goodbye into `Left` before it reaches the bus.
        ClientMessage::Goodbye => Routed::Ignored,
    }
}
