//! Rendering of intercepted calls as log lines.
//!
//! A call renders as `[address: ]name(arg = value, ...)[ = ret][ (PASSTHRU)]`. Integers
//! print in hex, text is quoted and escaped, and arguments named with the variadic prefix
//! print by value only.

use log::{debug, info};

use crate::emulation::{
    capture::types::ParamValue,
    memory::Bitness,
    process::{EmulationConfig, Verbosity},
};

/// One call to be reported.
#[derive(Clone, Copy, Debug)]
pub struct CallReport<'a> {
    /// Guest address of the routine.
    pub address: u64,
    /// Hook name, prefix included or not.
    pub name: &'a str,
    /// Parameters in declaration order.
    pub params: &'a [(String, ParamValue)],
    /// Return value; [`ParamValue::Absent`] omits the ` = ret` suffix.
    pub retval: &'a ParamValue,
    /// Whether the hook let the original routine run.
    pub passthru: bool,
}

/// Wraps `text` in double quotes, escaping quotes, backslashes and control characters.
#[must_use]
pub fn stringify(text: &str) -> String {
    format!("{text:?}")
}

/// Renders `report` according to `config`.
#[must_use]
pub fn describe_call(report: &CallReport<'_>, config: &EmulationConfig, bitness: Bitness) -> String {
    let name = report
        .name
        .strip_prefix(config.hook_prefix.as_str())
        .unwrap_or(report.name);

    let args = report
        .params
        .iter()
        .map(|(param, value)| {
            if param.is_empty() || param.starts_with(config.variadic_prefix.as_str()) {
                value.to_string()
            } else {
                format!("{param} = {value}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ");

    let mut line = String::new();
    if config.verbosity >= Verbosity::Debug {
        let digits = bitness.pointer_size() * 2;
        line.push_str(&format!("0x{:0digits$x}: ", report.address));
    }

    line.push_str(name);
    line.push('(');
    line.push_str(&args);
    line.push(')');

    if report.retval.is_present() {
        line.push_str(" = ");
        line.push_str(&report.retval.to_string());
    }
    if report.passthru {
        line.push_str(" (PASSTHRU)");
    }

    line
}

/// Emits `report` through the `log` facade.
///
/// Uses `debug!` at [`Verbosity::Debug`], `info!` at [`Verbosity::Default`] and nothing when
/// reporting is disabled.
pub fn log_call(report: &CallReport<'_>, config: &EmulationConfig, bitness: Bitness) {
    match config.verbosity {
        Verbosity::Disabled => {}
        Verbosity::Default => info!("{}", describe_call(report, config, bitness)),
        Verbosity::Debug => debug!("{}", describe_call(report, config, bitness)),
    }
}

/// Appends `args` to `params` under the names `<prefix>0`, `<prefix>1`, ...
pub fn push_variadic_params<I>(params: &mut Vec<(String, ParamValue)>, prefix: &str, args: I)
where
    I: IntoIterator,
    I::Item: Into<ParamValue>,
{
    params.extend(
        args.into_iter()
            .enumerate()
            .map(|(index, arg)| (format!("{prefix}{index}"), arg.into())),
    );
}
