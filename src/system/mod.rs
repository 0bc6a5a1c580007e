pub mod command;
pub mod root;
pub mod terminal;

/// True when this process already runs with effective uid 0.
pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Wraps `value` in single quotes for a POSIX shell.
///
/// Embedded single quotes are closed, escaped and reopened (`'\''`).
pub fn quote_shell_arg(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
