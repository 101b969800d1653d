//! Administrator rights for writing into the installation root.
//!
//! On Windows a non-elevated process relaunches itself through the "runas" verb
//! and exits. Other platforms run as-is.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Elevation {
    /// Continue in this process.
    Elevated,
    /// An elevated copy was started; this process should exit.
    Relaunched,
}

pub fn ensure_elevated() -> Result<Elevation, String> {
    if is_elevated() {
        return Ok(Elevation::Elevated);
    }
    log::info!("not elevated; relaunching as administrator");
    relaunch_elevated()?;
    Ok(Elevation::Relaunched)
}

#[cfg(windows)]
pub fn is_elevated() -> bool {
    use windows_sys::Win32::UI::Shell::IsUserAnAdmin;
    unsafe { IsUserAnAdmin() != 0 }
}

#[cfg(not(windows))]
pub fn is_elevated() -> bool {
    true
}

#[cfg(windows)]
fn relaunch_elevated() -> Result<(), String> {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use windows_sys::Win32::UI::Shell::ShellExecuteW;
    use windows_sys::Win32::UI::WindowsAndMessaging::SW_SHOWNORMAL;

    fn wide(s: &OsStr) -> Vec<u16> {
        s.encode_wide().chain(std::iter::once(0)).collect()
    }

    let exe = std::env::current_exe().map_err(|e| e.to_string())?;
    let args: Vec<String> = std::env::args().skip(1).collect();
    let params = quote_args(&args);

    let verb = wide(OsStr::new("runas"));
    let file = wide(exe.as_os_str());
    let params = wide(OsStr::new(&params));

    let result = unsafe {
        ShellExecuteW(
            std::ptr::null_mut(),
            verb.as_ptr(),
            file.as_ptr(),
            params.as_ptr(),
            std::ptr::null(),
            SW_SHOWNORMAL,
        )
    };
    // ShellExecuteW signals failure with values <= 32.
    if (result as isize) <= 32 {
        return Err(format!("ShellExecuteW failed ({})", result as isize));
    }
    Ok(())
}

#[cfg(not(windows))]
fn relaunch_elevated() -> Result<(), String> {
    Err("elevation is only supported on Windows".to_string())
}

/// Joins arguments into one command line that `CommandLineToArgvW` splits back into
/// the same arguments.
pub fn quote_args(args: &[String]) -> String {
    args.iter().map(|a| quote_arg(a)).collect::<Vec<_>>().join(" ")
}

fn quote_arg(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains([' ', '\t', '\n', '\x0b', '"']) {
        return arg.to_string();
    }

    let mut out = String::with_capacity(arg.len() + 2);
    out.push('"');
    let mut backslashes = 0usize;
    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                // backslashes before a quote are doubled, plus one to escape the quote
                out.extend(std::iter::repeat('\\').take(backslashes * 2 + 1));
                out.push('"');
                backslashes = 0;
            }
            _ => {
                out.extend(std::iter::repeat('\\').take(backslashes));
                out.push(c);
                backslashes = 0;
            }
        }
    }
    // trailing backslashes sit before the closing quote
    out.extend(std::iter::repeat('\\').take(backslashes * 2));
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_with_spaces_are_quoted() {
        let args = vec![
            "--install-root".to_string(),
            r"C:\Program Files (x86)\Steam".to_string(),
            "say \"hi\"".to_string(),
            String::new(),
        ];
        assert_eq!(
            quote_args(&args),
            r#"--install-root "C:\Program Files (x86)\Steam" "say \"hi\"" """#
        );
    }

    #[test]
    fn backslashes_before_quotes_are_doubled() {
        let args = vec![
            "--install-root".to_string(),
            r"D:\Program Files\Steam\".to_string(),
            "--no-restart".to_string(),
        ];
        assert_eq!(
            quote_args(&args),
            r#"--install-root "D:\Program Files\Steam\\" --no-restart"#
        );

        // a backslash run followed by a literal quote
        assert_eq!(quote_arg(r#"a b\"c"#), r#""a b\\\"c""#);
        // unquoted arguments keep their backslashes as-is
        assert_eq!(quote_arg(r"C:\dir\"), r"C:\dir\");
        assert_eq!(quote_arg(r"a\\b c"), r#""a\\b c""#);
    }

    #[cfg(not(windows))]
    #[test]
    fn non_windows_is_always_elevated() {
        assert_eq!(ensure_elevated(), Ok(Elevation::Elevated));
    }
}
