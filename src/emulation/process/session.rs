//! The emulation session, entry point for hooks and API shims.

use std::io::Write;

use log::debug;

use crate::{
    emulation::{
        capture::{self, CallLedger, CallReport, ParamValue},
        engine::{Detour, FaultClassifier, GuestMachine},
        kernel::{DriverObject, IoRequestEmulator, IoctlCode, IoctlOutcome, WriteOutcome},
        memory::GuestMemory,
        process::EmulationConfig,
        runtime::{self, format::StringSlot, StringWidth},
    },
    Result,
};

/// Owns the configuration and the call ledger of one emulated program.
///
/// Guest memory, the CPU and the driver object are borrowed per operation, so a session can
/// outlive any number of requests and the borrow checker rules out reentrant use.
///
/// # Examples
///
/// ```rust
/// use drvscope::emulation::{Bitness, EmulationSession, GuestHeap, SandboxMemory};
///
/// let mut memory = SandboxMemory::new(Bitness::Bit32, 0x1000);
/// let address = memory.alloc_with_data(b"hello world\0")?;
///
/// let mut session = EmulationSession::default();
/// assert_eq!(session.read_cstring(&memory, address)?, "hello world");
/// assert!(session.ledger().positions("world").is_some());
/// # Ok::<(), drvscope::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct EmulationSession {
    config: EmulationConfig,
    ledger: CallLedger,
}

impl Default for EmulationSession {
    fn default() -> Self {
        Self::new(EmulationConfig::default())
    }
}

impl EmulationSession {
    /// Creates a session with `config` and an empty ledger.
    #[must_use]
    pub fn new(config: EmulationConfig) -> Self {
        let ledger = CallLedger::new(config.hook_prefix.clone());
        EmulationSession { config, ledger }
    }

    /// The session configuration.
    #[must_use]
    pub fn config(&self) -> &EmulationConfig {
        &self.config
    }

    /// The call ledger.
    #[must_use]
    pub fn ledger(&self) -> &CallLedger {
        &self.ledger
    }

    /// Mutable access to the call ledger, e.g. to [`reset`](CallLedger::reset) it.
    pub fn ledger_mut(&mut self) -> &mut CallLedger {
        &mut self.ledger
    }

    /// Records an intercepted call in the ledger.
    pub fn record_call(
        &mut self,
        address: u64,
        name: &str,
        params: Vec<(String, ParamValue)>,
        retval: ParamValue,
        retaddr: u64,
    ) {
        self.ledger
            .record_call(address, name, params, retval, retaddr);
    }

    fn capture(&mut self, text: &str) {
        if self.config.capture_strings {
            self.ledger.record_string_appearance(text);
        }
    }

    fn read_text<M: GuestMemory + ?Sized>(
        &mut self,
        memory: &M,
        address: u64,
        width: StringWidth,
    ) -> Result<String> {
        let text = runtime::read_string(memory, address, width, self.config.max_string_length)?;
        self.capture(&text);
        Ok(text)
    }

    /// Reads a null-terminated narrow string and indexes its tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if the memory is unreadable or no terminator is found within
    /// [`max_string_length`](EmulationConfig::max_string_length) bytes.
    pub fn read_cstring<M: GuestMemory + ?Sized>(&mut self, memory: &M, address: u64) -> Result<String> {
        self.read_text(memory, address, StringWidth::Narrow)
    }

    /// Reads a null-terminated wide string and indexes its tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if the memory is unreadable or no terminator is found within
    /// [`max_string_length`](EmulationConfig::max_string_length) bytes.
    pub fn read_wstring<M: GuestMemory + ?Sized>(&mut self, memory: &M, address: u64) -> Result<String> {
        self.read_text(memory, address, StringWidth::Wide)
    }

    /// Reads a GUID.
    ///
    /// # Errors
    ///
    /// Returns an error if the memory is unreadable.
    pub fn read_guid<M: GuestMemory + ?Sized>(&self, memory: &M, address: u64) -> Result<uguid::Guid> {
        runtime::read_guid(memory, address)
    }

    /// Reads the variadic words for `format` from `pointer`.
    ///
    /// # Errors
    ///
    /// Returns an error if the memory is unreadable.
    pub fn fetch_variadic_args<M: GuestMemory + ?Sized>(
        &self,
        memory: &M,
        format: &str,
        pointer: u64,
    ) -> Result<Vec<u64>> {
        runtime::fetch_variadic_args(memory, format, pointer)
    }

    /// Formats `format` against guest words, dereferencing string arguments.
    ///
    /// `wide` selects the width of a plain `%s`. Every dereferenced string is indexed in the
    /// ledger.
    ///
    /// # Errors
    ///
    /// Returns an error if a string argument is unreadable or the format needs more
    /// arguments than `words` holds.
    pub fn format_apply<M: GuestMemory + ?Sized>(
        &mut self,
        memory: &M,
        format: &str,
        words: &[u64],
        wide: bool,
    ) -> Result<String> {
        let width = StringWidth::from_wide(wide);
        let max_len = self.config.max_string_length;

        let args = runtime::resolve_args(format, words, width, |address, slot: &StringSlot| {
            let text = if slot.counted {
                runtime::read_counted_string(memory, address, slot.width)?
            } else {
                runtime::read_string(memory, address, slot.width, max_len)?
            };
            self.capture(&text);
            Ok(text)
        })?;

        runtime::render(format, &args, memory.bitness(), width)
    }

    /// Emulates `sprintf`/`swprintf`: formats and writes the terminated result to `buffer`.
    ///
    /// Returns the number of characters written, terminator excluded.
    ///
    /// # Errors
    ///
    /// See [`format_apply`](Self::format_apply); also fails if `buffer` is not writable.
    pub fn emulate_sprintf<M: GuestMemory + ?Sized>(
        &mut self,
        memory: &mut M,
        buffer: u64,
        format: &str,
        words: &[u64],
        wide: bool,
    ) -> Result<usize> {
        let text = self.format_apply(&*memory, format, words, wide)?;
        runtime::stdio::write_formatted(memory, buffer, &text, StringWidth::from_wide(wide))
    }

    /// Emulates `printf`/`wprintf`: formats and writes the UTF-8 result to `out`.
    ///
    /// Returns the number of characters written.
    ///
    /// # Errors
    ///
    /// See [`format_apply`](Self::format_apply); also fails if `out` does.
    pub fn emulate_printf<M, W>(
        &mut self,
        memory: &M,
        out: &mut W,
        format: &str,
        words: &[u64],
        wide: bool,
    ) -> Result<usize>
    where
        M: GuestMemory + ?Sized,
        W: Write + ?Sized,
    {
        let text = self.format_apply(memory, format, words, wide)?;
        runtime::stdio::print_formatted(out, &text)
    }

    /// Sends `input` to `driver` as a write request.
    ///
    /// See [`IoRequestEmulator::io_write`].
    ///
    /// # Errors
    ///
    /// Returns an error if guest memory access fails or the dispatch routine faulted fatally.
    pub fn io_write<M, D, F>(
        &self,
        machine: &mut M,
        driver: &D,
        classifier: F,
        input: &[u8],
    ) -> Result<WriteOutcome>
    where
        M: GuestMachine + ?Sized,
        D: DriverObject + ?Sized,
        F: FaultClassifier,
    {
        let outcome = IoRequestEmulator::new(driver, classifier).io_write(machine, input)?;
        debug!(
            "write of {} bytes: success = {}, information = {:?}",
            input.len(),
            outcome.success,
            outcome.information
        );
        Ok(outcome)
    }

    /// Sends a device-control request to `driver`.
    ///
    /// See [`IoRequestEmulator::io_control`].
    ///
    /// # Errors
    ///
    /// Returns an error if guest memory access fails or the dispatch routine faulted fatally.
    pub fn io_control<M, D, F>(
        &self,
        machine: &mut M,
        driver: &D,
        classifier: F,
        code: IoctlCode,
        output_size: usize,
        input: &[u8],
    ) -> Result<IoctlOutcome>
    where
        M: GuestMachine + ?Sized,
        D: DriverObject + ?Sized,
        F: FaultClassifier,
    {
        let outcome = IoRequestEmulator::new(driver, classifier).io_control(
            machine,
            code,
            output_size,
            input,
        )?;
        debug!(
            "ioctl {code}: status = {:?}, {} bytes returned",
            outcome.status,
            outcome.output.len()
        );
        Ok(outcome)
    }

    /// Renders a call the way [`log_call`](Self::log_call) would report it.
    #[must_use]
    pub fn describe_call<M: GuestMemory + ?Sized>(&self, memory: &M, report: &CallReport<'_>) -> String {
        capture::describe_call(report, &self.config, memory.bitness())
    }

    /// Reports a call through the `log` facade at the configured verbosity.
    pub fn log_call<M: GuestMemory + ?Sized>(&self, memory: &M, report: &CallReport<'_>) {
        capture::log_call(report, &self.config, memory.bitness());
    }

    /// Appends variadic arguments to `params` under the configured prefix.
    pub fn push_variadic_params<I>(&self, params: &mut Vec<(String, ParamValue)>, args: I)
    where
        I: IntoIterator,
        I::Item: Into<ParamValue>,
    {
        capture::push_variadic_params(params, &self.config.variadic_prefix, args);
    }

    /// Makes the current hook return into `[start, end)`; see [`Detour`].
    ///
    /// # Errors
    ///
    /// Returns an error if the stack top cannot be read or written.
    pub fn begin_detour<M: GuestMachine + ?Sized>(
        &self,
        machine: &mut M,
        start: u64,
        end: u64,
    ) -> Result<Detour> {
        Detour::begin(machine, start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulation::{Bitness, GuestHeap, SandboxMemory};

    fn memory() -> SandboxMemory {
        SandboxMemory::new(Bitness::Bit32, 0x1000)
    }

    #[test]
    fn cstring_records_tokens_at_current_position() {
        let mut memory = memory();
        let address = memory.alloc_with_data(b"hello\0").unwrap();

        let mut session = EmulationSession::default();
        session.record_call(0x10, "hook_first", vec![], ParamValue::Absent, 0);
        assert_eq!(session.read_cstring(&memory, address).unwrap(), "hello");

        let positions = session.ledger().positions("hello").unwrap();
        assert_eq!(positions.iter().copied().collect::<Vec<_>>(), [1]);
    }

    #[test]
    fn wstring_and_capture_switch() {
        let mut memory = memory();
        let address = memory
            .alloc_with_data(&[b'a', 0, b' ', 0, b'b', 0, 0, 0])
            .unwrap();

        let mut session = EmulationSession::new(EmulationConfig::quiet());
        assert_eq!(session.read_wstring(&memory, address).unwrap(), "a b");
        assert_eq!(session.ledger().tokens().count(), 0);
    }

    #[test]
    fn string_limit_comes_from_config() {
        let mut memory = memory();
        let address = memory.alloc_with_data(b"0123456789\0").unwrap();

        let mut session =
            EmulationSession::new(EmulationConfig::default().with_max_string_length(4));
        assert!(session.read_cstring(&memory, address).is_err());
    }

    #[test]
    fn format_apply_indexes_arguments() {
        let mut memory = memory();
        let name = memory.alloc_with_data(b"x\0").unwrap();

        let mut session = EmulationSession::default();
        let text = session
            .format_apply(&memory, "%s=%d", &[name, 5], false)
            .unwrap();
        assert_eq!(text, "x=5");
        assert!(session.ledger().positions("x").is_some());
    }

    #[test]
    fn sprintf_through_va_list() {
        let mut memory = memory();
        let name = memory.alloc_with_data(b"drv\0").unwrap();
        let mut va_list = Vec::new();
        for word in [name, 0xFFFF_FFFF_u64] {
            va_list.extend_from_slice(&u32::try_from(word).unwrap().to_le_bytes());
        }
        let pointer = memory.alloc_with_data(&va_list).unwrap();
        let buffer = memory.alloc(32).unwrap();

        let mut session = EmulationSession::default();
        let words = session.fetch_variadic_args(&memory, "%s %d", pointer).unwrap();
        let count = session
            .emulate_sprintf(&mut memory, buffer, "%s %d", &words, false)
            .unwrap();

        assert_eq!(count, 6);
        assert_eq!(memory.read(buffer, 7).unwrap(), b"drv -1\0");
    }

    #[test]
    fn star_width_through_va_list() {
        let mut memory = memory();
        let va_list: Vec<u8> = [5u32, 42].iter().flat_map(|word| word.to_le_bytes()).collect();
        let pointer = memory.alloc_with_data(&va_list).unwrap();

        let mut session = EmulationSession::default();
        let words = session.fetch_variadic_args(&memory, "[%*d]", pointer).unwrap();
        assert_eq!(words, [5, 42]);

        let text = session.format_apply(&memory, "[%*d]", &words, false).unwrap();
        assert_eq!(text, "[   42]");
    }
}
