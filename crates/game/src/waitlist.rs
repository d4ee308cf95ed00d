//! Login wait-list
//!
//! When the world is full, rejected logins are queued with a deadline and
//! told their slot and retry interval. Premium characters queue ahead of
//! free ones. The list lives on the game thread and is never shared.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use otgate_core::CharacterGuid;

/// Grace added past the advertised retry before an entry expires.
const DEADLINE_GRACE: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy)]
struct WaitEntry {
    deadline: Instant,
    guid: CharacterGuid,
    premium: bool,
}

#[derive(Debug, Default)]
pub struct WaitList {
    entries: VecDeque<WaitEntry>,
}

/// Outcome of a capacity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitDecision {
    Admit,
    /// Come back in `retry_seconds`; currently at `slot` in line.
    Wait { slot: u32, retry_seconds: u32 },
}

impl WaitList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evaluate one login attempt against capacity. Re-evaluating the same
    /// character refreshes its entry rather than re-queueing it.
    pub fn evaluate(
        &mut self,
        now: Instant,
        guid: CharacterGuid,
        premium: bool,
        privileged: bool,
        players_online: u32,
        max_players: u32,
    ) -> WaitDecision {
        if privileged {
            return WaitDecision::Admit;
        }

        let free_slots = max_players as i64 - players_online as i64;
        if max_players == 0 || (self.entries.is_empty() && free_slots > 0) {
            return WaitDecision::Admit;
        }

        // Expired entries at the front no longer hold a place in line.
        while let Some(front) = self.entries.front() {
            if front.deadline <= now {
                self.entries.pop_front();
            } else {
                break;
            }
        }

        // Count the live entries ahead of this character's own entry, or
        // the whole list when it is not queued yet.
        let mut premium_ahead = 0u32;
        let mut free_ahead = 0u32;
        let mut own_index = None;
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.deadline <= now {
                continue;
            }
            if entry.guid == guid {
                own_index = Some(index);
                break;
            }
            if entry.premium {
                premium_ahead += 1;
            } else {
                free_ahead += 1;
            }
        }

        let mut slot = premium_ahead + 1;
        if !premium {
            slot += free_ahead;
        }

        let retry_seconds = (((slot / 5) + 1) * 5).min(60);

        if i64::from(slot) <= free_slots {
            if let Some(index) = own_index {
                self.entries.remove(index);
            }
            return WaitDecision::Admit;
        }

        let deadline = now + Duration::from_secs(u64::from(retry_seconds)) + DEADLINE_GRACE;
        match own_index {
            Some(index) => self.entries[index].deadline = deadline,
            None => self.entries.push_back(WaitEntry {
                deadline,
                guid,
                premium,
            }),
        }

        WaitDecision::Wait {
            slot,
            retry_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: u32 = 2;

    fn guid(n: u32) -> CharacterGuid {
        CharacterGuid::new(n)
    }

    #[test]
    fn test_privileged_callers_always_enter() {
        let mut list = WaitList::new();
        let now = Instant::now();
        assert_eq!(
            list.evaluate(now, guid(1), false, true, 100, 2),
            WaitDecision::Admit
        );
        assert!(list.is_empty());
    }

    #[test]
    fn test_zero_capacity_disables_the_list() {
        let mut list = WaitList::new();
        let now = Instant::now();
        assert_eq!(
            list.evaluate(now, guid(1), false, false, 5000, 0),
            WaitDecision::Admit
        );
    }

    #[test]
    fn test_premium_client_on_full_world_waits_at_slot_one() {
        let mut list = WaitList::new();
        let now = Instant::now();

        // Two non-premium already in, world of two.
        let decision = list.evaluate(now, guid(7), true, false, FULL, FULL);
        assert_eq!(
            decision,
            WaitDecision::Wait {
                slot: 1,
                retry_seconds: 5
            }
        );
        assert_eq!(list.len(), 1);

        // Retrying within the window keeps the same slot.
        let again = list.evaluate(now + Duration::from_secs(3), guid(7), true, false, FULL, FULL);
        assert_eq!(
            again,
            WaitDecision::Wait {
                slot: 1,
                retry_seconds: 5
            }
        );
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_premium_queues_ahead_of_free() {
        let mut list = WaitList::new();
        let now = Instant::now();

        // One free character queues first, then a premium one.
        list.evaluate(now, guid(1), false, false, FULL, FULL);
        let premium = list.evaluate(now, guid(2), true, false, FULL, FULL);
        // The free entry ahead does not count against a premium caller.
        assert_eq!(
            premium,
            WaitDecision::Wait {
                slot: 1,
                retry_seconds: 5
            }
        );

        // A second free character counts both entries ahead.
        let free = list.evaluate(now, guid(3), false, false, FULL, FULL);
        assert_eq!(
            free,
            WaitDecision::Wait {
                slot: 2,
                retry_seconds: 5
            }
        );
    }

    #[test]
    fn test_expired_entries_fall_off_the_front() {
        let mut list = WaitList::new();
        let now = Instant::now();
        list.evaluate(now, guid(1), false, false, FULL, FULL);
        list.evaluate(now, guid(2), false, false, FULL, FULL);

        // Past every deadline, a newcomer sees an empty line.
        let later = now + Duration::from_secs(120);
        let decision = list.evaluate(later, guid(3), false, false, FULL, FULL);
        assert_eq!(
            decision,
            WaitDecision::Wait {
                slot: 1,
                retry_seconds: 5
            }
        );
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_front_of_line_enters_when_capacity_frees_up() {
        let mut list = WaitList::new();
        let now = Instant::now();
        list.evaluate(now, guid(1), false, false, FULL, FULL);

        // One player logged off; the queued character's slot (1) now fits.
        let decision = list.evaluate(
            now + Duration::from_secs(1),
            guid(1),
            false,
            false,
            FULL - 1,
            FULL,
        );
        assert_eq!(decision, WaitDecision::Admit);
        assert!(list.is_empty());
    }

    #[test]
    fn test_retry_interval_scales_with_slot_and_caps_at_sixty() {
        let mut list = WaitList::new();
        let now = Instant::now();
        for n in 1..=70 {
            list.evaluate(now, guid(n), false, false, FULL, FULL);
        }
        let decision = list.evaluate(now, guid(71), false, false, FULL, FULL);
        match decision {
            WaitDecision::Wait {
                slot,
                retry_seconds,
            } => {
                assert_eq!(slot, 71);
                assert_eq!(retry_seconds, 60);
            }
            WaitDecision::Admit => panic!("expected wait"),
        }
    }
}
