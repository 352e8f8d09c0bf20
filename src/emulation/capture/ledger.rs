//! The call ledger and string index.

use std::collections::{BTreeSet, HashMap};

use log::trace;

use crate::emulation::capture::types::{CallRecord, ParamValue};

/// Ordered record of intercepted calls and the strings observed between them.
///
/// Every recorded call takes the next position, starting at 0. Strings decoded from guest
/// memory are split on single spaces and each token is indexed under the position of the
/// *next* call to be recorded, so a token can be correlated with the call that consumed it.
///
/// # Examples
///
/// ```rust
/// use drvscope::emulation::capture::{CallLedger, ParamValue};
///
/// let mut ledger = CallLedger::new("hook_");
/// ledger.record_string_appearance("kernel32.dll");
/// ledger.record_call(0x1000, "hook_LoadLibraryA", vec![], ParamValue::Integer(0x7700_0000), 0x401020);
///
/// assert_eq!(ledger.calls()[0].name, "LoadLibraryA");
/// assert!(ledger.positions("kernel32.dll").unwrap().contains(&0));
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallLedger {
    hook_prefix: String,
    calls: Vec<CallRecord>,
    strings: HashMap<String, BTreeSet<usize>>,
    counter: usize,
}

impl CallLedger {
    /// Creates an empty ledger that strips `hook_prefix` from recorded names.
    pub fn new(hook_prefix: impl Into<String>) -> Self {
        CallLedger {
            hook_prefix: hook_prefix.into(),
            ..Default::default()
        }
    }

    /// Appends a call record at the current position and advances the counter.
    pub fn record_call(
        &mut self,
        address: u64,
        name: &str,
        params: Vec<(String, ParamValue)>,
        retval: ParamValue,
        retaddr: u64,
    ) {
        let name = name.strip_prefix(self.hook_prefix.as_str()).unwrap_or(name);
        trace!("ledger[{}] {name} @ 0x{address:X}", self.counter);

        self.calls.push(CallRecord {
            name: name.to_string(),
            params,
            retval,
            address,
            retaddr,
            position: self.counter,
        });
        self.counter += 1;
    }

    /// Indexes every space-separated token of `text` at the current position.
    pub fn record_string_appearance(&mut self, text: &str) {
        for token in text.split(' ') {
            self.strings
                .entry(token.to_string())
                .or_default()
                .insert(self.counter);
        }
    }

    /// Clears all records and the string index and restarts positions at 0.
    pub fn reset(&mut self) {
        self.calls.clear();
        self.strings.clear();
        self.counter = 0;
    }

    /// All recorded calls in order.
    #[must_use]
    pub fn calls(&self) -> &[CallRecord] {
        &self.calls
    }

    /// Recorded calls with the given (prefix-stripped) name.
    pub fn calls_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a CallRecord> + 'a {
        self.calls.iter().filter(move |call| call.name == name)
    }

    /// Positions at which `token` was observed.
    #[must_use]
    pub fn positions(&self, token: &str) -> Option<&BTreeSet<usize>> {
        self.strings.get(token)
    }

    /// All indexed tokens.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.strings.keys().map(String::as_str)
    }

    /// Number of recorded calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    /// The position the next recorded call will take.
    #[must_use]
    pub fn sequence(&self) -> usize {
        self.counter
    }

    /// The prefix stripped from recorded names.
    #[must_use]
    pub fn hook_prefix(&self) -> &str {
        &self.hook_prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ledger: &mut CallLedger, name: &str) {
        ledger.record_call(0x1000, name, vec![], ParamValue::Absent, 0x2000);
    }

    #[test]
    fn positions_are_consecutive() {
        let mut ledger = CallLedger::new("hook_");
        for name in ["hook_a", "hook_b", "c"] {
            record(&mut ledger, name);
        }

        let positions: Vec<_> = ledger.calls().iter().map(|call| call.position).collect();
        assert_eq!(positions, [0, 1, 2]);
        assert_eq!(ledger.sequence(), 3);

        let names: Vec<_> = ledger.calls().iter().map(|call| call.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn prefix_is_stripped_once() {
        let mut ledger = CallLedger::new("hook_");
        record(&mut ledger, "hook_hook_x");
        assert_eq!(ledger.calls()[0].name, "hook_x");
    }

    #[test]
    fn reset_restarts_at_zero() {
        let mut ledger = CallLedger::new("hook_");
        record(&mut ledger, "a");
        ledger.record_string_appearance("token");
        ledger.reset();

        assert_eq!(ledger.call_count(), 0);
        assert!(ledger.positions("token").is_none());

        record(&mut ledger, "b");
        assert_eq!(ledger.calls()[0].position, 0);
    }

    #[test]
    fn tokens_index_current_position() {
        let mut ledger = CallLedger::new("hook_");
        ledger.record_string_appearance("open  file");
        record(&mut ledger, "a");
        ledger.record_string_appearance("file");

        assert_eq!(
            ledger.positions("file").unwrap().iter().copied().collect::<Vec<_>>(),
            [0, 1]
        );
        assert!(ledger.positions("open").unwrap().contains(&0));
        // Consecutive spaces produce an empty token.
        assert!(ledger.positions("").is_some());
    }

    #[test]
    fn calls_named() {
        let mut ledger = CallLedger::new("hook_");
        for name in ["hook_a", "hook_b", "hook_a"] {
            record(&mut ledger, name);
        }

        let positions: Vec<_> = ledger.calls_named("a").map(|call| call.position).collect();
        assert_eq!(positions, [0, 2]);
    }
}
