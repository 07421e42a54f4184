//! Shell command builders for the remote host
//!
//! Every command is run through the remote user's login shell on its own
//! channel. Builders only format strings; callers interpret exit status.

use wb_core::RemotePid;

/// Quote a value for a POSIX shell
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-:+=@,".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// `pkill -f` pattern matching the helper that listens on `port`
///
/// The first character is wrapped in a bracket expression so the pattern
/// never matches the shell that runs pkill.
pub fn helper_pattern(helper: &str, port: u16) -> String {
    format!("{}{},", helper_pattern_prefix(helper), port)
}

/// Pattern up to the listening port, e.g. `[s]ocat TCP-LISTEN:`
fn helper_pattern_prefix(helper: &str) -> String {
    let name = helper.rsplit('/').next().unwrap_or(helper);
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => format!("[{}]{} TCP-LISTEN:", first, chars.as_str()),
        None => "TCP-LISTEN:".to_string(),
    }
}

pub fn log_path(log_dir: &str, port: u16) -> String {
    format!("{}/whalebridge-{}.log", log_dir.trim_end_matches('/'), port)
}

pub fn pid_path(log_dir: &str, port: u16) -> String {
    format!("{}/whalebridge-{}.pid", log_dir.trim_end_matches('/'), port)
}

/// Exit 0 when the helper is on PATH
pub fn helper_available(helper: &str) -> String {
    format!("command -v {} >/dev/null 2>&1", shell_quote(helper))
}

/// First lines of the helper's version banner
pub fn helper_version(helper: &str) -> String {
    format!("{} -V 2>/dev/null | head -n 2", shell_quote(helper))
}

/// Exit 0 when the socket exists and is readable
pub fn socket_accessible(socket: &str) -> String {
    let socket = shell_quote(socket);
    format!("test -S {} && test -r {}", socket, socket)
}

/// Exit 0 when something is listening on `port`
pub fn port_listening(port: u16) -> String {
    format!(
        "{{ ss -tln 2>/dev/null || netstat -tln 2>/dev/null; }} | grep -q ':{} ' \
         || lsof -nP -iTCP:{} -sTCP:LISTEN >/dev/null 2>&1",
        port, port
    )
}

/// Exit 0 while the process exists
pub fn process_alive(pid: RemotePid) -> String {
    format!("kill -0 {} 2>/dev/null", pid)
}

/// Launch the helper detached; prints its pid and records it in the pid file
pub fn launch(helper: &str, bind_address: &str, port: u16, socket: &str, log_dir: &str) -> String {
    format!(
        "nohup {} TCP-LISTEN:{},bind={},reuseaddr,fork UNIX-CONNECT:{} > {} 2>&1 < /dev/null & \
         echo $! | tee {}",
        shell_quote(helper),
        port,
        shell_quote(bind_address),
        shell_quote(socket),
        shell_quote(&log_path(log_dir, port)),
        shell_quote(&pid_path(log_dir, port)),
    )
}

/// Tail of the helper's log
pub fn log_tail(log_dir: &str, port: u16) -> String {
    format!(
        "tail -n 20 {} 2>/dev/null",
        shell_quote(&log_path(log_dir, port))
    )
}

/// SIGTERM by pid (when known) and by port pattern; always exits 0
pub fn graceful_kill(pid: Option<RemotePid>, helper: &str, port: u16) -> String {
    let mut cmd = String::new();
    if let Some(pid) = pid {
        cmd.push_str(&format!("kill {} 2>/dev/null; ", pid));
    }
    cmd.push_str(&format!(
        "pkill -f '{}' 2>/dev/null; true",
        helper_pattern(helper, port)
    ));
    cmd
}

/// SIGKILL by pid (when known) and by port pattern; always exits 0
pub fn force_kill(pid: Option<RemotePid>, helper: &str, port: u16) -> String {
    let mut cmd = String::new();
    if let Some(pid) = pid {
        cmd.push_str(&format!("kill -9 {} 2>/dev/null; ", pid));
    }
    cmd.push_str(&format!(
        "pkill -9 -f '{}' 2>/dev/null; true",
        helper_pattern(helper, port)
    ));
    cmd
}

pub fn remove_pid_file(log_dir: &str, port: u16) -> String {
    format!("rm -f {}", shell_quote(&pid_path(log_dir, port)))
}

/// Kill every helper recorded in a pid file, by pid and by the port in the
/// file name, and remove the records; always exits 0
pub fn reclaim_recorded(helper: &str, log_dir: &str) -> String {
    format!(
        "for f in {dir}/whalebridge-*.pid; do [ -f \"$f\" ] || continue; \
         p=\"${{f##*/whalebridge-}}\"; p=\"${{p%.pid}}\"; \
         kill \"$(cat \"$f\")\" 2>/dev/null; \
         pkill -f \"{prefix}$p,\" 2>/dev/null; rm -f \"$f\"; done; true",
        dir = shell_quote(log_dir.trim_end_matches('/')),
        prefix = helper_pattern_prefix(helper),
    )
}

/// Kill a helper left on `port` by an earlier bridge; always exits 0
pub fn reclaim_port(helper: &str, port: u16, log_dir: &str) -> String {
    let pid_file = shell_quote(&pid_path(log_dir, port));
    format!(
        "if [ -f {pf} ]; then kill \"$(cat {pf})\" 2>/dev/null; rm -f {pf}; fi; \
         pkill -f '{pat}' 2>/dev/null; true",
        pf = pid_file,
        pat = helper_pattern(helper, port)
    )
}

/// Relay stdin/stdout to the control socket, for the tunnel strategy
pub fn stdio_relay(helper: &str, socket: &str) -> String {
    format!(
        "{} STDIO UNIX-CONNECT:{}",
        shell_quote(helper),
        shell_quote(socket)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/var/run/docker.sock"), "/var/run/docker.sock");
        assert_eq!(shell_quote("/tmp/my dir"), "'/tmp/my dir'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_helper_pattern_excludes_invoking_shell() {
        assert_eq!(helper_pattern("socat", 2376), "[s]ocat TCP-LISTEN:2376,");
        assert_eq!(
            helper_pattern("/usr/local/bin/socat", 2380),
            "[s]ocat TCP-LISTEN:2380,"
        );
    }

    #[test]
    fn test_launch_command() {
        assert_eq!(
            launch("socat", "127.0.0.1", 2376, "/var/run/docker.sock", "/tmp"),
            "nohup socat TCP-LISTEN:2376,bind=127.0.0.1,reuseaddr,fork \
             UNIX-CONNECT:/var/run/docker.sock > /tmp/whalebridge-2376.log 2>&1 < /dev/null & \
             echo $! | tee /tmp/whalebridge-2376.pid"
        );
    }

    #[test]
    fn test_checks() {
        assert_eq!(helper_available("socat"), "command -v socat >/dev/null 2>&1");
        assert_eq!(
            socket_accessible("/var/run/docker.sock"),
            "test -S /var/run/docker.sock && test -r /var/run/docker.sock"
        );
        assert_eq!(process_alive(RemotePid(42)), "kill -0 42 2>/dev/null");
        assert!(port_listening(2376).contains("grep -q ':2376 '"));
    }

    #[test]
    fn test_kill_commands_never_fail() {
        let graceful = graceful_kill(Some(RemotePid(7)), "socat", 2376);
        assert!(graceful.starts_with("kill 7 2>/dev/null; "));
        assert!(graceful.ends_with("; true"));

        let force = force_kill(None, "socat", 2376);
        assert_eq!(
            force,
            "pkill -9 -f '[s]ocat TCP-LISTEN:2376,' 2>/dev/null; true"
        );
        assert!(reclaim_port("socat", 2376, "/tmp").ends_with("; true"));
        assert!(reclaim_recorded("socat", "/tmp/").ends_with("; true"));
    }

    #[test]
    fn test_reclaim_recorded_kills_by_pid_and_port() {
        assert_eq!(
            reclaim_recorded("/usr/bin/socat", "/tmp/"),
            "for f in /tmp/whalebridge-*.pid; do [ -f \"$f\" ] || continue; \
             p=\"${f##*/whalebridge-}\"; p=\"${p%.pid}\"; \
             kill \"$(cat \"$f\")\" 2>/dev/null; \
             pkill -f \"[s]ocat TCP-LISTEN:$p,\" 2>/dev/null; rm -f \"$f\"; done; true"
        );
    }

    #[test]
    fn test_paths_trim_trailing_slash() {
        assert_eq!(log_path("/var/tmp/", 2390), "/var/tmp/whalebridge-2390.log");
        assert_eq!(pid_path("/var/tmp", 2390), "/var/tmp/whalebridge-2390.pid");
    }
}
