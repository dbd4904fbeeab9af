// Generation-tagged response slots for one phase instance.
//
// Every request the orchestrator fans out (a team proposal, a round of votes,
// a round of sabotage choices) gets a fresh `Generation` and a
// `ResponseSlots` holding one slot per expected responder plus a deadline.
// Answers are matched by tag: an answer carrying any other generation belongs
// to a phase instance that has already closed and is refused as stale, so a
// late reply can never leak into the next vote or the next proposal.
//
// A slot ends in one of three ways: answered, forfeited (the responder
// disconnected), or timed out when the slots are closed. `close` fills every
// unanswered slot with the phase's default and reports which responders it
// had to fill in.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use saboteur_protocol::{Generation, PlayerId};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum SlotError {
    #[error("answer for generation {got} arrived after it closed (current {current})")]
    Stale { got: u64, current: u64 },
    #[error("no answer is expected from this player")]
    NotExpected,
    #[error("this player has already answered")]
    AlreadyAnswered,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Slot<T> {
    Waiting,
    Answered(T),
    Forfeited,
}

#[derive(Debug)]
pub struct ResponseSlots<T> {
    generation: Generation,
    deadline: Instant,
    slots: BTreeMap<PlayerId, Slot<T>>,
}

/// What a closed phase instance collected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Closed<T> {
    /// One entry per expected responder, defaults filled in.
    pub answers: BTreeMap<PlayerId, T>,
    /// Responders still waiting at close.
    pub timed_out: Vec<PlayerId>,
    /// Responders that disconnected before answering.
    pub forfeited: Vec<PlayerId>,
}

impl<T> Closed<T> {
    /// Whether `player` actually answered (rather than being defaulted).
    pub fn answered(&self, player: PlayerId) -> bool {
        self.answers.contains_key(&player)
            && !self.timed_out.contains(&player)
            && !self.forfeited.contains(&player)
    }
}

impl<T: Clone> ResponseSlots<T> {
    pub fn open(
        generation: Generation,
        expected: impl IntoIterator<Item = PlayerId>,
        timeout: Duration,
    ) -> Self {
        Self {
            generation,
            deadline: Instant::now() + timeout,
            slots: expected.into_iter().map(|p| (p, Slot::Waiting)).collect(),
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn accept(
        &mut self,
        generation: Generation,
        from: PlayerId,
        answer: T,
    ) -> Result<(), SlotError> {
        if generation != self.generation {
            return Err(SlotError::Stale {
                got: generation.0,
                current: self.generation.0,
            });
        }
        let slot = self.slots.get_mut(&from).ok_or(SlotError::NotExpected)?;
        match *slot {
            Slot::Waiting => {
                *slot = Slot::Answered(answer);
                Ok(())
            }
            Slot::Answered(_) => Err(SlotError::AlreadyAnswered),
            Slot::Forfeited => Err(SlotError::NotExpected),
        }
    }

    /// Mark a disconnected responder. Returns whether a waiting slot was
    /// forfeited.
    pub fn forfeit(&mut self, player: PlayerId) -> bool {
        match self.slots.get_mut(&player) {
            Some(slot) if matches!(slot, Slot::Waiting) => {
                *slot = Slot::Forfeited;
                true
            }
            _ => false,
        }
    }

    /// No slot is still waiting.
    pub fn is_complete(&self) -> bool {
        !self.slots.values().any(|slot| matches!(slot, Slot::Waiting))
    }

    /// The deadline has passed; unanswered slots count as timed out.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    /// Finish the phase instance, filling unanswered slots with `default`.
    pub fn close(self, default: T) -> Closed<T> {
        let mut closed = Closed {
            answers: BTreeMap::new(),
            timed_out: Vec::new(),
            forfeited: Vec::new(),
        };
        for (player, slot) in self.slots {
            let answer = match slot {
                Slot::Answered(answer) => answer,
                Slot::Waiting => {
                    closed.timed_out.push(player);
                    default.clone()
                }
                Slot::Forfeited => {
                    closed.forfeited.push(player);
                    default.clone()
                }
            };
            closed.answers.insert(player, answer);
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn votes(expected: &[u32]) -> ResponseSlots<bool> {
        ResponseSlots::open(
            Generation(3),
            expected.iter().map(|&id| PlayerId(id)),
            Duration::from_secs(30),
        )
    }

    #[test]
    fn accepts_each_expected_answer_once() {
        let mut slots = votes(&[1, 2]);
        assert_eq!(slots.accept(Generation(3), PlayerId(1), true), Ok(()));
        assert!(!slots.is_complete());
        assert_eq!(
            slots.accept(Generation(3), PlayerId(1), false),
            Err(SlotError::AlreadyAnswered)
        );
        assert_eq!(slots.accept(Generation(3), PlayerId(2), false), Ok(()));
        assert!(slots.is_complete());

        let closed = slots.close(false);
        assert!(closed.answers[&PlayerId(1)]);
        assert!(!closed.answers[&PlayerId(2)]);
        assert!(closed.timed_out.is_empty());
        assert!(closed.answered(PlayerId(1)));
    }

    #[test]
    fn other_generations_are_stale() {
        let mut slots = votes(&[1]);
        assert_eq!(
            slots.accept(Generation(2), PlayerId(1), true),
            Err(SlotError::Stale { got: 2, current: 3 })
        );
        assert_eq!(
            slots.accept(Generation(4), PlayerId(1), true),
            Err(SlotError::Stale { got: 4, current: 3 })
        );
        assert!(!slots.is_complete());
    }

    #[test]
    fn unexpected_responder_is_refused() {
        let mut slots = votes(&[1, 2]);
        assert_eq!(
            slots.accept(Generation(3), PlayerId(5), true),
            Err(SlotError::NotExpected)
        );
        assert!(!slots.forfeit(PlayerId(5)));
        assert!(!slots.is_complete());
    }

    #[test]
    fn close_defaults_missing_answers_and_reports_them() {
        let mut slots = votes(&[1, 2, 3, 4, 5]);
        for id in [1, 2, 3] {
            slots.accept(Generation(3), PlayerId(id), true).unwrap();
        }
        assert!(slots.forfeit(PlayerId(5)));
        assert!(!slots.forfeit(PlayerId(5)));
        assert_eq!(
            slots.accept(Generation(3), PlayerId(5), true),
            Err(SlotError::NotExpected)
        );

        let closed = slots.close(false);
        assert_eq!(closed.answers.len(), 5);
        assert!(!closed.answers[&PlayerId(4)]);
        assert_eq!(closed.timed_out, vec![PlayerId(4)]);
        assert_eq!(closed.forfeited, vec![PlayerId(5)]);
        assert!(!closed.answered(PlayerId(4)));
        assert!(!closed.answered(PlayerId(5)));
    }

    #[test]
    fn forfeiting_everyone_completes() {
        let mut slots = votes(&[1, 2]);
        slots.forfeit(PlayerId(1));
        slots.accept(Generation(3), PlayerId(2), true).unwrap();
        assert!(slots.is_complete());
        assert!(!slots.forfeit(PlayerId(2)));
    }

    #[test]
    fn empty_slots_are_complete_immediately() {
        let slots: ResponseSlots<bool> = votes(&[]);
        assert!(slots.is_complete());
        assert!(slots.close(false).answers.is_empty());
    }

    #[test]
    fn deadline_expires() {
        let slots: ResponseSlots<bool> =
            ResponseSlots::open(Generation(1), [PlayerId(1)], Duration::ZERO);
        assert!(slots.is_expired(Instant::now()));
        assert!(!votes(&[1]).is_expired(Instant::now()));
    }
}
