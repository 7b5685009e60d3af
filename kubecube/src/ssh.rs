/// Shown in place of the jump host when none is configured.
pub const SSH_VIA_PLACEHOLDER: &str = "${SSH_VIA}";

/// `ssh -fN -L <local port>:<remote api addr> <via>`
///
/// Tooling parses this line, so the format is fixed.
pub fn port_forwarding_cmd(local_port: u16, remote_api_addr: &str, via: Option<&str>) -> String {
    let via = via
        .map(str::trim)
        .filter(|via| !via.is_empty())
        .unwrap_or(SSH_VIA_PLACEHOLDER);

    format!("ssh -fN -L {local_port}:{remote_api_addr} {via}")
}

/// Whether a process command line is the tunnel started from `forward_cmd`.
///
/// Arguments must match whole, in order; the program may be given by path.
pub fn is_forwarding_process(cmdline: &str, forward_cmd: &str) -> bool {
    let wanted: Vec<&str> = forward_cmd.split_whitespace().collect();
    let Some((program, args)) = wanted.split_first() else {
        return false;
    };

    let actual: Vec<&str> = cmdline.split_whitespace().collect();
    actual.windows(wanted.len()).any(|window| {
        let same_program =
            window[0] == *program || window[0].ends_with(&format!("/{program}"));
        same_program && window[1..] == *args
    })
}
