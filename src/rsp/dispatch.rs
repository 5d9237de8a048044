//! The command dispatcher: an exact-literal table tried first,
//! then an ordered regular-expression table. Handlers read from the dump
//! adapter and the thread table and return reply bytes; nothing here ever
//! panics on a malformed request — unparseable packets fall through to the
//! "unknown command" empty reply.

use crate::arch::Arch;
use crate::dump::DumpSession;
use crate::rsp::tid::{format_tid, parse_tid};
use crate::threads::{ThreadId, ThreadTable};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

pub struct RspState {
    pub dump: DumpSession,
    pub threads: ThreadTable,
    pub arch: Arch,
    pub noack_mode: bool,
    pub multiprocess: bool,
    pub big_packets: bool,
    pub running: bool,
    cursor: ThreadCursor,
}

#[derive(Default)]
struct ThreadCursor {
    ids: Vec<ThreadId>,
    index: usize,
}

impl RspState {
    pub fn new(dump: DumpSession, threads: ThreadTable) -> Self {
        let arch = dump.arch();
        RspState {
            dump,
            threads,
            arch,
            noack_mode: false,
            multiprocess: false,
            big_packets: false,
            running: true,
            cursor: ThreadCursor::default(),
        }
    }

    fn tid_str(&self, id: ThreadId) -> String {
        format_tid(id, self.multiprocess)
    }

    fn parse_tid(&self, s: &str) -> Option<ThreadId> {
        parse_tid(s, self.threads.default_pid())
    }
}

static MEM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^m([0-9a-f]+),([0-9a-f]+)$").unwrap());
static SELECT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^H[a-z](p?[0-9a-f.]+)$").unwrap());
static ALIVE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^T(p?[0-9a-f.]+)$").unwrap());
static SUPPORTED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^qSupported:(.+)$").unwrap());
static EXTRA_INFO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^qThreadExtraInfo,(p?[0-9a-f.]+)$").unwrap());
static DETACH_PID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^D;[0-9a-f]+$").unwrap());
static KILL_PID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^vKill;(p?[0-9a-f.]+)$").unwrap());
static ATTACHED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^qAttached:(.+)$").unwrap());

/// Dispatches one packet payload, returning the reply payload (unframed).
pub fn dispatch(state: &mut RspState, payload: &str) -> String {
    match payload {
        "g" => return read_registers(state),
        "qfThreadInfo" => return thread_info_first(state),
        "qsThreadInfo" => return thread_info_next(state),
        "QStartNoAckMode" => {
            state.noack_mode = true;
            return "OK".to_string();
        }
        "vMustReplyEmpty" => return String::new(),
        "Hc-1" => return "OK".to_string(),
        "?" => return format!("T05thread:{};", state.tid_str(state.threads.current())),
        "D" => {
            state.running = false;
            return "OK".to_string();
        }
        "k" => {
            state.running = false;
            return String::new();
        }
        _ => {}
    }

    if let Some(caps) = MEM_RE.captures(payload) {
        return read_memory(state, &caps[1], &caps[2]);
    }
    if let Some(caps) = SELECT_RE.captures(payload) {
        return select_thread(state, &caps[1]);
    }
    if let Some(caps) = ALIVE_RE.captures(payload) {
        return thread_alive(state, &caps[1]);
    }
    if let Some(caps) = SUPPORTED_RE.captures(payload) {
        return q_supported(state, &caps[1]);
    }
    if let Some(caps) = EXTRA_INFO_RE.captures(payload) {
        return thread_extra_info(state, &caps[1]);
    }
    if DETACH_PID_RE.is_match(payload) {
        state.running = false;
        return "OK".to_string();
    }
    if let Some(caps) = KILL_PID_RE.captures(payload) {
        let _ = &caps[1];
        state.running = false;
        return "OK".to_string();
    }
    if ATTACHED_RE.is_match(payload) {
        return "1".to_string();
    }

    String::new()
}

fn read_registers(state: &RspState) -> String {
    let id = state.threads.current();
    let regs = state.threads.regs(id).cloned().unwrap_or_default();
    encode_register_block(state.arch, &regs)
}

pub fn encode_register_block(arch: Arch, regs: &HashMap<String, u64>) -> String {
    let mut out = String::new();
    for &(name, width) in arch.layout() {
        match regs.get(name) {
            Some(&value) => {
                let bytes = value.to_le_bytes();
                for b in &bytes[..width] {
                    out.push_str(&format!("{:02x}", b));
                }
            }
            None => out.push_str(&"x".repeat(width * 2)),
        }
    }
    out
}

fn read_memory(state: &RspState, addr_hex: &str, len_hex: &str) -> String {
    let (Ok(addr), Ok(len)) = (
        u64::from_str_radix(addr_hex, 16),
        usize::from_str_radix(len_hex, 16),
    ) else {
        return "E14".to_string();
    };
    match state.dump.read(addr, len) {
        Some(bytes) => bytes.iter().map(|b| format!("{:02x}", b)).collect(),
        None => "E14".to_string(),
    }
}

fn q_supported(state: &mut RspState, features: &str) -> String {
    let (multiprocess, reply) = negotiate_supported(features);
    state.multiprocess = multiprocess;
    state.big_packets = true;
    reply
}

fn negotiate_supported(features: &str) -> (bool, String) {
    let multiprocess = features.split(';').any(|f| f == "multiprocess+");
    (multiprocess, "multiprocess+;QStartNoAckMode+".to_string())
}

fn thread_info_first(state: &mut RspState) -> String {
    let ids: Vec<ThreadId> = state.threads.threads().collect();
    if state.big_packets {
        let joined = ids
            .iter()
            .map(|&id| state.tid_str(id))
            .collect::<Vec<_>>()
            .join(",");
        state.cursor = ThreadCursor {
            ids,
            index: usize::MAX, // exhausted
        };
        format!("m{}", joined)
    } else {
        let first = ids.first().copied();
        state.cursor = ThreadCursor { ids, index: 1 };
        match first {
            Some(id) => format!("m{}", state.tid_str(id)),
            None => "l".to_string(),
        }
    }
}

fn thread_info_next(state: &mut RspState) -> String {
    if state.big_packets && state.cursor.index == usize::MAX {
        return "l".to_string();
    }
    match state.cursor.ids.get(state.cursor.index).copied() {
        Some(id) => {
            state.cursor.index += 1;
            format!("m{}", state.tid_str(id))
        }
        None => "l".to_string(),
    }
}

fn select_thread(state: &mut RspState, tid_field: &str) -> String {
    if let Some(id) = state.parse_tid(tid_field) {
        state.threads.set_current(id);
    }
    "OK".to_string()
}

fn thread_alive(state: &RspState, tid_field: &str) -> String {
    match state.parse_tid(tid_field) {
        Some(id) if state.threads.is_alive(id) => "OK".to_string(),
        _ => "E03".to_string(),
    }
}

fn thread_extra_info(state: &RspState, tid_field: &str) -> String {
    let Some(id) = state.parse_tid(tid_field) else {
        return String::new();
    };
    match state.threads.extra(id) {
        Some(extra) => extra.bytes().map(|b| format!("{:02x}", b)).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn register_block_pads_missing_registers_with_x() {
        let mut regs = HashMap::new();
        regs.insert("rip".to_string(), 0x0123_4567_89ab_cdef);
        let encoded = encode_register_block(Arch::X86_64, &regs);
        // rax..rbp..rsp..r8-r15 (16 regs, all missing) precede rip.
        let zeros_len = 16 * 8 * 2;
        assert_eq!(&encoded[..zeros_len], "x".repeat(zeros_len).as_str());
        let rip_field = &encoded[zeros_len..zeros_len + 16];
        assert_eq!(rip_field, "efcdab8967452301");
        assert_eq!(encoded.len(), 2 * Arch::X86_64.reg_block_bytes());
    }

    #[test]
    fn register_block_length_matches_layout_for_every_arch() {
        for arch in [Arch::X86_64, Arch::Aarch64, Arch::Riscv64] {
            let regs = HashMap::new();
            let encoded = encode_register_block(arch, &regs);
            assert_eq!(encoded.len(), 2 * arch.reg_block_bytes());
        }
    }

    #[test]
    fn q_supported_gates_multiprocess_on_negotiated_feature() {
        let (multiprocess, reply) = negotiate_supported("multiprocess+;xmlRegisters=i386");
        assert!(multiprocess);
        assert_eq!(reply, "multiprocess+;QStartNoAckMode+");
    }

    #[test]
    fn q_supported_without_multiprocess_feature_stays_single_process() {
        let (multiprocess, _) = negotiate_supported("xmlRegisters=i386");
        assert!(!multiprocess);
    }
}
