#![forbid(unsafe_code)]

//! Lazily cached terminal classification.
//!
//! A handle answers three questions about its descriptor:
//!
//! | Question | Meaning |
//! |----------|---------|
//! | interactive | descriptor is a tty or pty |
//! | real terminal | interactive and reports a non-zero width and height |
//! | colors | real terminal whose environment advertises color |
//!
//! Each answer is a tri-state ([`LazyBool`]) resolved on first query through
//! a [`TerminalProbe`] and memoized for the life of the handle. Answers are
//! independent: resolving one never resolves another, and a resolved answer
//! never changes even if the terminal does.
//!
//! # Color Heuristic
//!
//! Color support is read from the environment, in this order:
//! - `NO_COLOR` set: no color
//! - `COLORTERM` non-empty: color
//! - `TERM` is `ansi`, `cygwin`, `linux`, starts with `screen`, `xterm`,
//!   `vt100`, `rxvt`, `tmux`, or ends with `color`: color
//! - otherwise no color

use std::env;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::sys::{self, RawDescriptor, descriptor_is_valid};

/// `TERM` prefixes that imply color support.
const COLOR_TERM_PREFIXES: &[&str] = &["screen", "xterm", "vt100", "rxvt", "tmux"];

/// `TERM` values that imply color support.
const COLOR_TERMS: &[&str] = &["ansi", "cygwin", "linux"];

/// Environment inputs for the color heuristic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColorEnv {
    /// `NO_COLOR` is present.
    pub no_color: bool,
    /// Value of `TERM`.
    pub term: String,
    /// Value of `COLORTERM`.
    pub colorterm: String,
}

impl ColorEnv {
    /// Snapshot the current process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            no_color: env::var_os("NO_COLOR").is_some(),
            term: env::var("TERM").unwrap_or_default(),
            colorterm: env::var("COLORTERM").unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn term(mut self, term: impl Into<String>) -> Self {
        self.term = term.into();
        self
    }

    #[must_use]
    pub fn colorterm(mut self, colorterm: impl Into<String>) -> Self {
        self.colorterm = colorterm.into();
        self
    }

    #[must_use]
    pub fn no_color(mut self, no_color: bool) -> Self {
        self.no_color = no_color;
        self
    }

    /// Whether these inputs advertise color.
    #[must_use]
    pub fn supports_colors(&self) -> bool {
        if self.no_color {
            return false;
        }
        if !self.colorterm.is_empty() {
            return true;
        }
        let term = self.term.as_str();
        COLOR_TERMS.contains(&term)
            || COLOR_TERM_PREFIXES.iter().any(|p| term.starts_with(p))
            || term.ends_with("color")
    }
}

/// Host-environment queries behind terminal classification.
pub trait TerminalProbe: Send + Sync {
    /// Whether `fd` is a tty or pty.
    fn is_terminal(&self, fd: RawDescriptor) -> bool;

    /// Window size as `(columns, rows)`, if the descriptor reports one.
    fn window_size(&self, fd: RawDescriptor) -> Option<(u16, u16)>;

    /// Whether the terminal behind `fd` is expected to render color.
    fn supports_colors(&self, fd: RawDescriptor) -> bool;
}

/// Probe backed by the OS and the process environment.
#[derive(Debug, Clone)]
pub struct HostTerminalProbe {
    colors: ColorEnv,
}

impl HostTerminalProbe {
    /// Probe using the current environment for color detection.
    #[must_use]
    pub fn new() -> Self {
        Self::with_color_env(ColorEnv::from_env())
    }

    #[must_use]
    pub fn with_color_env(colors: ColorEnv) -> Self {
        Self { colors }
    }
}

impl Default for HostTerminalProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalProbe for HostTerminalProbe {
    fn is_terminal(&self, fd: RawDescriptor) -> bool {
        sys::is_terminal(fd)
    }

    fn window_size(&self, fd: RawDescriptor) -> Option<(u16, u16)> {
        sys::window_size(fd)
    }

    fn supports_colors(&self, _fd: RawDescriptor) -> bool {
        self.colors.supports_colors()
    }
}

/// Tri-state for a lazily resolved answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LazyBool {
    /// Not yet resolved.
    #[default]
    Calculate,
    Yes,
    No,
}

impl LazyBool {
    fn of(cell: &OnceLock<bool>) -> Self {
        match cell.get() {
            None => Self::Calculate,
            Some(true) => Self::Yes,
            Some(false) => Self::No,
        }
    }
}

/// Memoized interactive / real-terminal / color answers for one handle.
pub struct TerminalClassifier {
    probe: Arc<dyn TerminalProbe>,
    interactive: OnceLock<bool>,
    real_terminal: OnceLock<bool>,
    colors: OnceLock<bool>,
}

impl TerminalClassifier {
    #[must_use]
    pub fn new(probe: Arc<dyn TerminalProbe>) -> Self {
        Self {
            probe,
            interactive: OnceLock::new(),
            real_terminal: OnceLock::new(),
            colors: OnceLock::new(),
        }
    }

    /// Is `fd` a tty or pty?
    pub fn is_interactive(&self, fd: RawDescriptor) -> bool {
        *self.interactive.get_or_init(|| {
            let answer = descriptor_is_valid(fd) && self.probe.is_terminal(fd);
            tracing::trace!(fd, answer, "resolved interactive");
            answer
        })
    }

    /// Is `fd` a terminal with a non-zero width and height?
    pub fn is_real_terminal(&self, fd: RawDescriptor) -> bool {
        *self.real_terminal.get_or_init(|| {
            let answer = self.probe_real_terminal(fd);
            tracing::trace!(fd, answer, "resolved real terminal");
            answer
        })
    }

    /// Is `fd` a real terminal that supports colors?
    pub fn is_terminal_with_colors(&self, fd: RawDescriptor) -> bool {
        *self.colors.get_or_init(|| {
            let answer = self.probe_real_terminal(fd) && self.probe.supports_colors(fd);
            tracing::trace!(fd, answer, "resolved terminal colors");
            answer
        })
    }

    fn probe_real_terminal(&self, fd: RawDescriptor) -> bool {
        descriptor_is_valid(fd)
            && self.probe.is_terminal(fd)
            && self
                .probe
                .window_size(fd)
                .is_some_and(|(cols, rows)| cols > 0 && rows > 0)
    }

    /// Current `(interactive, real_terminal, colors)` states.
    #[must_use]
    pub fn state(&self) -> (LazyBool, LazyBool, LazyBool) {
        (
            LazyBool::of(&self.interactive),
            LazyBool::of(&self.real_terminal),
            LazyBool::of(&self.colors),
        )
    }

    /// Forget every resolved answer.
    pub fn reset(&mut self) {
        self.interactive = OnceLock::new();
        self.real_terminal = OnceLock::new();
        self.colors = OnceLock::new();
    }

    /// Replace the probe; resolved answers are forgotten.
    pub fn set_probe(&mut self, probe: Arc<dyn TerminalProbe>) {
        self.probe = probe;
        self.reset();
    }
}

impl Default for TerminalClassifier {
    fn default() -> Self {
        Self::new(Arc::new(HostTerminalProbe::new()))
    }
}

impl fmt::Debug for TerminalClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (interactive, real_terminal, colors) = self.state();
        f.debug_struct("TerminalClassifier")
            .field("interactive", &interactive)
            .field("real_terminal", &real_terminal)
            .field("colors", &colors)
            .finish_non_exhaustive()
    }
}
