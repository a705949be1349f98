//! Pending-mutation bookkeeping shared by the domain containers
//!
//! One ledger entry per (field) tracks the in-flight optimistic change:
//! the rollback baseline recorded at issuance and a token that makes
//! resolution idempotent. A mutation resolves exactly once; a superseded
//! command's late completion is a no-op because its token no longer matches.
//! A server event that targets a pending field is recorded as an observation
//! and becomes the field's value once the command succeeds: the server is
//! authoritative once observed.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug)]
struct PendingEntry<V> {
    token: u64,
    baseline: V,
    in_flight: bool,
    /// Server value observed while this mutation was pending, if any.
    observed: Option<V>,
}

/// Outcome of resolving a successful command.
#[derive(Debug, PartialEq)]
pub enum Resolution<V> {
    /// The token no longer owns the field; nothing to do.
    Superseded,
    /// Confirmed; the optimistic value stands.
    Confirmed,
    /// Confirmed, but a server event arrived while the command was pending.
    /// The carried server value is authoritative and must be applied.
    Observed(V),
}

/// Ledger of pending optimistic mutations, keyed by field.
#[derive(Debug)]
pub struct FieldLedger<F, V> {
    entries: HashMap<F, PendingEntry<V>>,
    next_token: u64,
}

impl<F: Eq + Hash + Copy, V> Default for FieldLedger<F, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            next_token: 0,
        }
    }
}

impl<F: Eq + Hash + Copy, V> FieldLedger<F, V> {
    /// Record a new mutation for `field` and return its token.
    ///
    /// `baseline` is the value observed at issuance time. If the field
    /// already has a pending mutation that never reached the network, the
    /// new one takes over the slot but keeps the original rollback baseline
    /// (the burst rolls back as a whole). If the earlier one is already in
    /// flight, the new baseline stands and the earlier command's resolution
    /// becomes a stale no-op.
    pub fn begin(&mut self, field: F, baseline: V) -> u64 {
        self.next_token += 1;
        let token = self.next_token;
        match self.entries.get_mut(&field) {
            Some(entry) if !entry.in_flight => {
                entry.token = token;
                // A new intent outranks any server value seen so far.
                entry.observed = None;
            }
            Some(entry) => {
                entry.token = token;
                entry.baseline = baseline;
                entry.in_flight = false;
                entry.observed = None;
            }
            None => {
                self.entries.insert(
                    field,
                    PendingEntry {
                        token,
                        baseline,
                        in_flight: false,
                        observed: None,
                    },
                );
            }
        }
        token
    }

    /// Mark the mutation as having started its network call. Returns false
    /// when the token was superseded, in which case the caller skips the
    /// send entirely.
    pub fn mark_in_flight(&mut self, field: F, token: u64) -> bool {
        match self.entries.get_mut(&field) {
            Some(entry) if entry.token == token => {
                entry.in_flight = true;
                true
            }
            _ => false,
        }
    }

    /// True while any mutation for `field` is unresolved; server events must
    /// not overwrite such a field directly.
    pub fn is_pending(&self, field: F) -> bool {
        self.entries.contains_key(&field)
    }

    /// Record a server value observed while `field` has a pending mutation.
    /// A later observation replaces an earlier one; the latest server truth
    /// wins when the command confirms.
    pub fn observe(&mut self, field: F, value: V) {
        if let Some(entry) = self.entries.get_mut(&field) {
            entry.observed = Some(value);
        }
    }

    /// Confirm the mutation. When a server event was observed while the
    /// command was pending, its value is returned and must replace the
    /// optimistic one.
    pub fn resolve_success(&mut self, field: F, token: u64) -> Resolution<V> {
        if self.entries.get(&field).is_some_and(|e| e.token == token) {
            match self.entries.remove(&field).and_then(|e| e.observed) {
                Some(server) => Resolution::Observed(server),
                None => Resolution::Confirmed,
            }
        } else {
            Resolution::Superseded
        }
    }

    /// Fail the mutation. Returns the rollback baseline recorded at
    /// issuance, or `None` when the token was superseded (the newer pending
    /// value is presumed more current and stands). An observed server value
    /// is dropped: a rejected command rolls back to the baseline.
    pub fn resolve_failure(&mut self, field: F, token: u64) -> Option<V> {
        if self.entries.get(&field).is_some_and(|e| e.token == token) {
            self.entries.remove(&field).map(|e| e.baseline)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
    enum Field {
        Volume,
        Shuffle,
    }

    #[test]
    fn failure_rolls_back_to_issuance_baseline() {
        let mut ledger: FieldLedger<Field, u8> = FieldLedger::default();
        let token = ledger.begin(Field::Volume, 40);
        assert!(ledger.mark_in_flight(Field::Volume, token));
        assert_eq!(ledger.resolve_failure(Field::Volume, token), Some(40));
        assert!(!ledger.is_pending(Field::Volume));
    }

    #[test]
    fn a_mutation_resolves_exactly_once() {
        let mut ledger: FieldLedger<Field, u8> = FieldLedger::default();
        let token = ledger.begin(Field::Volume, 40);
        assert_eq!(
            ledger.resolve_success(Field::Volume, token),
            Resolution::Confirmed
        );
        assert_eq!(
            ledger.resolve_success(Field::Volume, token),
            Resolution::Superseded
        );
        assert_eq!(ledger.resolve_failure(Field::Volume, token), None);
    }

    #[test]
    fn observed_server_value_wins_on_success() {
        let mut ledger: FieldLedger<Field, u8> = FieldLedger::default();
        let token = ledger.begin(Field::Volume, 40);
        assert!(ledger.mark_in_flight(Field::Volume, token));
        ledger.observe(Field::Volume, 70);
        // The server spoke while the command was pending; its value stands.
        assert_eq!(
            ledger.resolve_success(Field::Volume, token),
            Resolution::Observed(70)
        );
        assert!(!ledger.is_pending(Field::Volume));
    }

    #[test]
    fn observed_server_value_is_dropped_on_failure() {
        let mut ledger: FieldLedger<Field, u8> = FieldLedger::default();
        let token = ledger.begin(Field::Volume, 40);
        assert!(ledger.mark_in_flight(Field::Volume, token));
        ledger.observe(Field::Volume, 70);
        assert_eq!(ledger.resolve_failure(Field::Volume, token), Some(40));
    }

    #[test]
    fn reissue_discards_a_stale_observation() {
        let mut ledger: FieldLedger<Field, u8> = FieldLedger::default();
        let first = ledger.begin(Field::Volume, 40);
        assert!(ledger.mark_in_flight(Field::Volume, first));
        ledger.observe(Field::Volume, 70);

        // A newer intent outranks the observed value.
        let second = ledger.begin(Field::Volume, 55);
        assert_eq!(
            ledger.resolve_success(Field::Volume, first),
            Resolution::Superseded
        );
        assert!(ledger.mark_in_flight(Field::Volume, second));
        assert_eq!(
            ledger.resolve_success(Field::Volume, second),
            Resolution::Confirmed
        );
    }

    #[test]
    fn reissue_before_network_keeps_the_burst_baseline() {
        let mut ledger: FieldLedger<Field, u8> = FieldLedger::default();
        let first = ledger.begin(Field::Volume, 40);
        // Second intent lands before the first reached the network.
        let second = ledger.begin(Field::Volume, 55);

        // The first command never sends.
        assert!(!ledger.mark_in_flight(Field::Volume, first));
        assert!(ledger.mark_in_flight(Field::Volume, second));
        // Rollback targets the value from before the whole burst.
        assert_eq!(ledger.resolve_failure(Field::Volume, second), Some(40));
    }

    #[test]
    fn reissue_while_in_flight_supersedes_the_old_token() {
        let mut ledger: FieldLedger<Field, u8> = FieldLedger::default();
        let first = ledger.begin(Field::Volume, 40);
        assert!(ledger.mark_in_flight(Field::Volume, first));

        let second = ledger.begin(Field::Volume, 55);
        // The first command's late failure must not roll anything back.
        assert_eq!(ledger.resolve_failure(Field::Volume, first), None);
        assert!(ledger.is_pending(Field::Volume));

        assert!(ledger.mark_in_flight(Field::Volume, second));
        assert_eq!(ledger.resolve_failure(Field::Volume, second), Some(55));
    }

    #[test]
    fn fields_are_independent() {
        let mut ledger: FieldLedger<Field, u8> = FieldLedger::default();
        let volume = ledger.begin(Field::Volume, 40);
        let shuffle = ledger.begin(Field::Shuffle, 0);
        assert!(ledger.is_pending(Field::Volume));
        assert!(ledger.is_pending(Field::Shuffle));
        assert_eq!(
            ledger.resolve_success(Field::Shuffle, shuffle),
            Resolution::Confirmed
        );
        assert!(ledger.is_pending(Field::Volume));
        assert_eq!(ledger.resolve_failure(Field::Volume, volume), Some(40));
    }
}
