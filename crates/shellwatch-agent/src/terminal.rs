//! Controlling terminal handling.
//!
//! The user's terminal is put in raw mode for the life of the monitored
//! session so every keystroke reaches the pty unprocessed; the shell's own
//! line discipline lives on the pty. [`RawModeGuard`] restores the saved
//! settings on every exit path.

use std::os::fd::{AsFd, AsRawFd};

use nix::{
    pty::Winsize,
    sys::termios::{
        self, InputFlags, LocalFlags, OutputFlags, SetArg, SpecialCharacterIndices, Termios,
    },
};

use crate::{error::AgentError, policy::LineDiscipline};

/// Terminal in raw mode; the saved settings are restored on drop.
pub struct RawModeGuard<F: AsFd> {
    fd: F,
    saved: Termios,
}

impl<F: AsFd> RawModeGuard<F> {
    /// Save the settings of `fd` and switch it to raw mode.
    pub fn enter(fd: F) -> Result<Self, AgentError> {
        let saved = termios::tcgetattr(&fd)
            .map_err(|e| AgentError::Terminal(format!("tcgetattr: {e}")))?;

        let raw = make_raw(saved.clone());
        termios::tcsetattr(&fd, SetArg::TCSANOW, &raw)
            .map_err(|e| AgentError::Terminal(format!("tcsetattr: {e}")))?;

        Ok(Self { fd, saved })
    }

    /// Settings in effect before raw mode; copied onto the new pty.
    pub fn saved(&self) -> &Termios {
        &self.saved
    }
}

impl<F: AsFd> Drop for RawModeGuard<F> {
    fn drop(&mut self) {
        if let Err(e) = termios::tcsetattr(&self.fd, SetArg::TCSANOW, &self.saved) {
            tracing::warn!("failed to restore terminal settings: {}", e);
        }
    }
}

/// Raw-mode variant of `settings`: no input translation, no flow control, no
/// signals, no echo, no output processing, reads return after one byte.
pub fn make_raw(mut settings: Termios) -> Termios {
    settings.input_flags |= InputFlags::IGNPAR;
    settings.input_flags &= !(InputFlags::ISTRIP
        | InputFlags::INLCR
        | InputFlags::IGNCR
        | InputFlags::ICRNL
        | InputFlags::IXON
        | InputFlags::IXANY
        | InputFlags::IXOFF);
    settings.local_flags &= !(LocalFlags::ISIG
        | LocalFlags::ICANON
        | LocalFlags::ECHO
        | LocalFlags::ECHOE
        | LocalFlags::ECHOK
        | LocalFlags::ECHONL
        | LocalFlags::IEXTEN);
    settings.output_flags &= !OutputFlags::OPOST;
    settings.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
    settings.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
    settings
}

/// Echo and canonical flags of `settings`.
pub fn discipline_of(settings: &Termios) -> LineDiscipline {
    LineDiscipline {
        canonical: settings.local_flags.contains(LocalFlags::ICANON),
        echo: settings.local_flags.contains(LocalFlags::ECHO),
    }
}

/// Current line discipline of the pty behind `fd`.
pub fn line_discipline(fd: impl AsFd) -> Result<LineDiscipline, AgentError> {
    termios::tcgetattr(fd)
        .map(|settings| discipline_of(&settings))
        .map_err(|e| AgentError::Terminal(format!("tcgetattr: {e}")))
}

/// Window size of the terminal behind `fd`.
#[allow(unsafe_code)]
pub fn window_size(fd: impl AsFd) -> Result<Winsize, AgentError> {
    let mut ws = Winsize { ws_row: 0, ws_col: 0, ws_xpixel: 0, ws_ypixel: 0 };
    // Safety: TIOCGWINSZ writes one winsize into the valid, exclusively
    // borrowed `ws`; the fd is borrowed for the duration of the call.
    let ret = unsafe { libc::ioctl(fd.as_fd().as_raw_fd(), libc::TIOCGWINSZ, &mut ws) };
    if ret < 0 {
        return Err(AgentError::Terminal(format!(
            "ioctl TIOCGWINSZ failed: {}",
            std::io::Error::last_os_error()
        )));
    }
    Ok(ws)
}

/// Set the window size of the terminal behind `fd`.
#[allow(unsafe_code)]
pub fn set_window_size(fd: impl AsFd, ws: &Winsize) -> Result<(), AgentError> {
    // Safety: TIOCSWINSZ reads one winsize from `ws`; the fd is borrowed for
    // the duration of the call.
    let ret = unsafe { libc::ioctl(fd.as_fd().as_raw_fd(), libc::TIOCSWINSZ, ws) };
    if ret < 0 {
        return Err(AgentError::Terminal(format!(
            "ioctl TIOCSWINSZ failed: {}",
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use nix::pty::openpty;

    use super::*;

    #[test]
    fn raw_mode_clears_canonical_and_echo() {
        let pty = openpty(None, None).unwrap();
        let cooked = termios::tcgetattr(&pty.slave).unwrap();
        assert!(discipline_of(&cooked).canonical);

        let raw = make_raw(cooked);
        assert_eq!(discipline_of(&raw), LineDiscipline::RAW);
        assert!(!raw.input_flags.contains(InputFlags::ICRNL));
        assert!(!raw.output_flags.contains(OutputFlags::OPOST));
        assert_eq!(raw.control_chars[SpecialCharacterIndices::VMIN as usize], 1);
    }

    #[test]
    fn guard_restores_settings() {
        let pty = openpty(None, None).unwrap();
        let before = discipline_of(&termios::tcgetattr(&pty.slave).unwrap());

        {
            let _guard = RawModeGuard::enter(&pty.slave).unwrap();
            assert_eq!(line_discipline(&pty.slave).unwrap(), LineDiscipline::RAW);
        }

        assert_eq!(line_discipline(&pty.slave).unwrap(), before);
    }

    #[test]
    fn password_prompt_visible_through_master() {
        let pty = openpty(None, None).unwrap();
        let mut settings = termios::tcgetattr(&pty.slave).unwrap();
        settings.local_flags |= LocalFlags::ICANON;
        settings.local_flags &= !LocalFlags::ECHO;
        termios::tcsetattr(&pty.slave, SetArg::TCSANOW, &settings).unwrap();

        // The agent samples the discipline through the master side
        assert_eq!(line_discipline(&pty.master).unwrap(), LineDiscipline::PASSWORD_PROMPT);
    }

    #[test]
    fn window_size_round_trips_through_pty() {
        let pty = openpty(None, None).unwrap();
        let ws = Winsize { ws_row: 42, ws_col: 132, ws_xpixel: 0, ws_ypixel: 0 };

        set_window_size(&pty.master, &ws).unwrap();
        let read = window_size(&pty.slave).unwrap();

        assert_eq!((read.ws_row, read.ws_col), (42, 132));
    }
}
