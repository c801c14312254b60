//! Elevated privilege detection

/// Whether the current process runs with administrative rights
#[cfg(unix)]
pub fn is_elevated() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

/// Whether the current process runs with administrative rights.
///
/// `net session` only succeeds for members of the Administrators group
/// running with an elevated token.
#[cfg(windows)]
pub fn is_elevated() -> bool {
    std::process::Command::new("net")
        .arg("session")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(not(any(unix, windows)))]
pub fn is_elevated() -> bool {
    false
}
