//! Interface to the host application's process.
//!
//! Only what the patcher needs: whether the host is up, whether its UI
//! window is open, and a way to hand it a `steam://`-style URI. Starting,
//! stopping and restarting the host is left to the user.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;

use sysinfo::System;

/// Errors raised while signalling the host.
#[derive(thiserror::Error, Debug)]
pub enum HostError {
    /// The host executable could not be launched.
    #[error("Failed to launch {path}: {source}")]
    Launch {
        /// Executable that failed to start
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Operations on the running host application.
pub trait HostControl: Send + Sync {
    /// True if a host process is running.
    fn is_running(&self) -> bool;

    /// True if the host's UI window is present.
    fn window_present(&self) -> bool;

    /// Fire-and-forget a URI command at the host.
    fn send_signal(&self, uri: &str) -> Result<(), HostError>;
}

/// [`HostControl`] backed by the process table and the host executable.
#[derive(Debug, Clone)]
pub struct SystemHost {
    process_name: String,
    window_class: String,
    executable: PathBuf,
}

impl SystemHost {
    /// Create a host handle.
    ///
    /// # Arguments
    ///
    /// * `process_name` - Process name to look for (case-insensitive)
    /// * `executable` - Executable that accepts URI commands
    #[must_use]
    pub fn new(process_name: impl Into<String>, executable: &Path) -> Self {
        Self {
            process_name: process_name.into(),
            window_class: DEFAULT_WINDOW_CLASS.to_string(),
            executable: executable.to_path_buf(),
        }
    }

    /// Set the window class that marks the host's UI window.
    #[must_use]
    pub fn with_window_class(mut self, class: impl Into<String>) -> Self {
        self.window_class = class.into();
        self
    }

    /// The window class looked up by [`HostControl::window_present`].
    #[must_use]
    pub fn window_class(&self) -> &str {
        &self.window_class
    }
}

/// Window class of the host's UI window.
pub const DEFAULT_WINDOW_CLASS: &str = "SDL_app";

#[cfg(windows)]
fn find_window_class(class: &str) -> bool {
    use std::os::windows::ffi::OsStrExt;
    use windows_sys::Win32::UI::WindowsAndMessaging::FindWindowW;

    let wide: Vec<u16> = std::ffi::OsStr::new(class)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();
    // SAFETY: `wide` is NUL-terminated and outlives the call; a null window
    // name matches any title.
    let hwnd = unsafe { FindWindowW(wide.as_ptr(), std::ptr::null()) };
    !hwnd.is_null()
}

impl HostControl for SystemHost {
    fn is_running(&self) -> bool {
        let mut system = System::new();
        system.refresh_processes();
        system
            .processes()
            .values()
            .any(|p| p.name().eq_ignore_ascii_case(&self.process_name))
    }

    #[cfg(windows)]
    fn window_present(&self) -> bool {
        find_window_class(&self.window_class)
    }

    // No portable window lookup; a running host is assumed to have its UI
    // window open.
    #[cfg(not(windows))]
    fn window_present(&self) -> bool {
        self.is_running()
    }

    fn send_signal(&self, uri: &str) -> Result<(), HostError> {
        log::debug!("Signalling host: {} {}", self.executable.display(), uri);
        let mut child = Command::new(&self.executable)
            .arg(uri)
            .spawn()
            .map_err(|source| HostError::Launch {
                path: self.executable.clone(),
                source,
            })?;
        // Reap in the background so the caller never blocks on the host.
        thread::spawn(move || {
            let _ = child.wait();
        });
        Ok(())
    }
}
