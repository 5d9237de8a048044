//! The thread model: synthesizes a thread list from CPU
//! prstatus records and optional sidecar task data. Built once at startup;
//! never mutated afterward except for the "current thread" cursor.

use crate::dump::DumpSession;
use crate::sidecar::SidecarData;
use std::collections::HashMap;

pub type ThreadId = (u64, u64);

pub struct Thread {
    pub pid: u64,
    pub tid: u64,
    pub regs: HashMap<String, u64>,
    pub extra: String,
}

pub struct ThreadTable {
    threads: Vec<Thread>,
    current: ThreadId,
    default_pid: u64,
}

impl ThreadTable {
    pub fn build_kernel_only(session: &DumpSession) -> Self {
        let mut threads = Vec::new();
        let mut current = None;
        for c in 0..session.cpu_count() {
            let cpu = session.cpu_prstatus(c).expect("cpu index in range");
            let extra = if cpu.pid != 0 {
                format!("CPU #{:x} pid {}", c, cpu.pid)
            } else {
                format!("CPU #{:x} idle", c)
            };
            if current.is_none() && cpu.pid != 0 {
                current = Some((1, c as u64 + 1));
            }
            threads.push(Thread {
                pid: 1,
                tid: c as u64 + 1,
                regs: cpu.regs,
                extra,
            });
        }
        ThreadTable {
            threads,
            current: current.unwrap_or((1, 1)),
            default_pid: 1,
        }
    }

    pub fn build_kernel_with_tasks(session: &DumpSession, sidecar: &SidecarData) -> Self {
        let n = session.cpu_count();
        let mut threads = Vec::with_capacity(n + sidecar.threads.len());
        let mut current = None;
        let mut active_tids: Vec<u64> = Vec::new();

        for c in 0..n {
            let cpu = session.cpu_prstatus(c).expect("cpu index in range");
            let matching_task = sidecar.threads.iter().find(|t| t.tid == cpu.pid);
            let extra = match matching_task {
                Some(task) => format!("pid {} LWP {} \"{}\"", task.tid, task.tid, task.comm),
                None if cpu.pid != 0 => format!("CPU #{:x} pid {}", c, cpu.pid),
                None => format!("CPU #{:x} idle", c),
            };
            if matching_task.is_some() {
                active_tids.push(cpu.pid);
            }
            if current.is_none() && cpu.pid != 0 {
                current = Some((1, c as u64 + 1));
            }
            threads.push(Thread {
                pid: 1,
                tid: c as u64 + 1,
                regs: cpu.regs,
                extra,
            });
        }

        let mut k = 1u64;
        for task in &sidecar.threads {
            if active_tids.contains(&task.tid) {
                continue;
            }
            threads.push(Thread {
                pid: 1,
                tid: n as u64 + k,
                regs: task.registers.clone(),
                extra: format!("pid {} LWP {} \"{}\"", task.pid, task.tid, task.comm),
            });
            k += 1;
        }

        ThreadTable {
            threads,
            current: current.unwrap_or((1, 1)),
            default_pid: 1,
        }
    }

    /// `session` must already have had `install_user_rootpgt` called
    /// against `sidecar.rootpgt` before this returns — callers build the
    /// table and reconfigure translation in the same step.
    pub fn build_process(session: &DumpSession, sidecar: &SidecarData) -> Self {
        let mut threads = Vec::with_capacity(sidecar.threads.len());
        let mut current = None;
        let cpu_pids: Vec<u64> = (0..session.cpu_count())
            .filter_map(|c| session.cpu_prstatus(c).map(|p| p.pid))
            .collect();

        for task in &sidecar.threads {
            threads.push(Thread {
                pid: task.pid,
                tid: task.tid,
                regs: task.registers.clone(),
                extra: format!("pid {} LWP {} \"{}\"", task.pid, task.tid, task.comm),
            });
            if cpu_pids.contains(&task.tid) {
                current = Some((task.pid, task.tid));
            }
        }

        let default_pid = sidecar.threads.first().map(|t| t.pid).unwrap_or(1);
        let last = threads.last().map(|t| (t.pid, t.tid)).unwrap_or((1, 1));
        ThreadTable {
            threads,
            current: current.unwrap_or(last),
            default_pid,
        }
    }

    pub fn threads(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.threads.iter().map(|t| (t.pid, t.tid))
    }

    pub fn set_current(&mut self, id: ThreadId) {
        if self.is_alive(id) {
            self.current = id;
        }
    }

    pub fn is_alive(&self, id: ThreadId) -> bool {
        self.threads.iter().any(|t| (t.pid, t.tid) == id)
    }

    pub fn current(&self) -> ThreadId {
        self.current
    }

    pub fn regs(&self, id: ThreadId) -> Option<&HashMap<String, u64>> {
        self.threads
            .iter()
            .find(|t| (t.pid, t.tid) == id)
            .map(|t| &t.regs)
    }

    pub fn extra(&self, id: ThreadId) -> Option<&str> {
        self.threads
            .iter()
            .find(|t| (t.pid, t.tid) == id)
            .map(|t| t.extra.as_str())
    }

    pub fn default_pid(&self) -> u64 {
        self.default_pid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sidecar::SidecarTask;

    fn task(pid: u64, tid: u64, comm: &str) -> SidecarTask {
        SidecarTask {
            pid,
            tid,
            comm: comm.to_string(),
            registers: HashMap::new(),
        }
    }

    #[test]
    fn process_mode_picks_last_thread_when_no_cpu_matches() {
        let sidecar = SidecarData {
            rootpgt: Some(0),
            loadaddr: Some(0),
            threads: vec![task(100, 100, "main"), task(100, 101, "worker")],
        };
        // No CPU prstatus data is available in this unit test, so emulate
        // the "no active pid among threads" fallback directly.
        let mut threads = Vec::new();
        let mut current = None;
        let cpu_pids: Vec<u64> = Vec::new();
        for t in &sidecar.threads {
            threads.push(Thread {
                pid: t.pid,
                tid: t.tid,
                regs: t.registers.clone(),
                extra: format!("pid {} LWP {} \"{}\"", t.pid, t.tid, t.comm),
            });
            if cpu_pids.contains(&t.tid) {
                current = Some((t.pid, t.tid));
            }
        }
        let last = threads.last().map(|t| (t.pid, t.tid)).unwrap();
        let table = ThreadTable {
            threads,
            current: current.unwrap_or(last),
            default_pid: sidecar.threads[0].pid,
        };
        assert_eq!(table.current(), (100, 101));
    }

    #[test]
    fn set_current_ignores_unknown_thread() {
        let mut table = ThreadTable {
            threads: vec![Thread {
                pid: 1,
                tid: 1,
                regs: HashMap::new(),
                extra: String::new(),
            }],
            current: (1, 1),
            default_pid: 1,
        };
        table.set_current((99, 99));
        assert_eq!(table.current(), (1, 1));
    }
}
