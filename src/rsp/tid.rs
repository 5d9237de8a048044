//! Thread-ID wire form: `p<hex pid>.<hex tid>` under multiprocess, `<hex
//! tid>` otherwise.

use crate::threads::ThreadId;

pub fn format_tid(id: ThreadId, multiprocess: bool) -> String {
    if multiprocess {
        format!("p{:x}.{:x}", id.0, id.1)
    } else {
        format!("{:x}", id.1)
    }
}

pub fn parse_tid(s: &str, default_pid: u64) -> Option<ThreadId> {
    if let Some(rest) = s.strip_prefix('p') {
        let mut parts = rest.splitn(2, '.');
        let pid = u64::from_str_radix(parts.next()?, 16).ok()?;
        let tid = u64::from_str_radix(parts.next()?, 16).ok()?;
        Some((pid, tid))
    } else {
        let tid = u64::from_str_radix(s, 16).ok()?;
        Some((default_pid, tid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_multiprocess_form() {
        assert_eq!(format_tid((1, 2), true), "p1.2");
    }

    #[test]
    fn formats_plain_form() {
        assert_eq!(format_tid((1, 2), false), "2");
    }

    #[test]
    fn parses_plain_form_with_default_pid() {
        assert_eq!(parse_tid("2a", 1), Some((1, 0x2a)));
    }

    #[test]
    fn parses_multiprocess_form() {
        assert_eq!(parse_tid("p1.2a", 99), Some((1, 0x2a)));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_tid("zz", 1), None);
    }
}
