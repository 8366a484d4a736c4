//! Column rendering for emitted open events, matching the classic
//! opensnoop layout: optional TIME and UID, then PID COMM FD ERR,
//! optional octal FLAGS, then PATH.

use chrono::Local;
use opensnoop_common::OpenEvent;

use crate::opts::Opts;

pub fn header(opts: &Opts) -> String {
    let mut line = String::new();
    if opts.timestamp {
        line.push_str(&format!("{:<8} ", "TIME"));
    }
    if opts.print_uid {
        line.push_str(&format!("{:<7}", "UID"));
    }
    line.push_str(&format!("{:<6} {:<16} {:>3} {:>3} ", "PID", "COMM", "FD", "ERR"));
    if opts.extended {
        line.push_str(&format!("{:>8} ", "FLAGS"));
    }
    line.push_str("PATH");
    line
}

pub fn format_event(opts: &Opts, event: &OpenEvent) -> String {
    let time = opts
        .timestamp
        .then(|| Local::now().format("%H:%M:%S").to_string());
    render(opts, event, time.as_deref())
}

fn render(opts: &Opts, event: &OpenEvent, time: Option<&str>) -> String {
    let (fd, err) = fd_err(event.ret);
    let mut line = String::new();
    if let Some(time) = time {
        line.push_str(&format!("{time:<8} "));
    }
    if opts.print_uid {
        line.push_str(&format!("{:<7}", event.uid));
    }
    line.push_str(&format!(
        "{:<6} {:<16} {:>3} {:>3} ",
        event.pid,
        decode(&event.comm),
        fd,
        err
    ));
    if opts.extended {
        line.push_str(&format!("{:08o} ", event.flags));
    }
    line.push_str(decode(&event.fname));
    line
}

/// Split the return code into the FD and ERR columns: a non-negative return
/// is a descriptor, a negative one encodes -errno.
fn fd_err(ret: i32) -> (i32, i32) {
    if ret >= 0 { (ret, 0) } else { (-1, -ret) }
}

fn decode(bytes: &[u8]) -> &str {
    std::str::from_utf8(bytes)
        .unwrap_or("<invalid>")
        .trim_matches(char::from(0))
}
