//! Process Manager
//!
//! Owns the process table and the platform services, and implements the
//! lifecycle operations on top of them. `fork`, `execv` and `exit`/
//! `waitpid` live in their own modules as further `impl` blocks.

use alloc::string::ToString;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Once;

use super::exec::UserEntry;
use super::table::{Pid, Process, ProcessSnapshot, ProcessTable};
use crate::config::ProcConfig;
use crate::error::{ProcError, ProcResult};
use crate::vfs::FileTable;
use crate::Platform;

/// Process manager
pub struct ProcessManager {
    pub(super) table: ProcessTable,
    pub(super) platform: Arc<dyn Platform>,
    pub(super) config: ProcConfig,
}

impl ProcessManager {
    /// Create the process table and install the root process.
    pub fn new(platform: Arc<dyn Platform>, config: ProcConfig) -> Self {
        let config = config.normalized();
        let table = ProcessTable::new(config.max_processes);

        let root = Process::new(
            Pid::KERNEL,
            Pid::KERNEL,
            "kernel".to_string(),
            None,
            FileTable::new(config.open_max),
        );
        root.set_thread(platform.current_thread());
        table.install_root(Arc::new(root));

        log::info!(
            "[PROC] Process manager initialized ({} slots, {} fds per process)",
            config.max_processes,
            config.open_max
        );

        Self {
            table,
            platform,
            config,
        }
    }

    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }

    pub fn lookup(&self, pid: Pid) -> Option<Arc<Process>> {
        self.table.lookup(pid)
    }

    /// PID of the caller, provided it is still registered.
    pub fn getpid(&self, caller: Pid) -> ProcResult<Pid> {
        self.table
            .lookup(caller)
            .map(|process| process.pid())
            .ok_or(ProcError::UnknownPid)
    }

    /// Current parent of the caller; the root once the original parent has
    /// exited.
    pub fn getppid(&self, caller: Pid) -> ProcResult<Pid> {
        self.table
            .lookup(caller)
            .map(|process| process.parent())
            .ok_or(ProcError::UnknownPid)
    }

    /// Start the first user program on the calling thread.
    ///
    /// Creates a child of the root, opens the console on descriptors 0..=2
    /// when configured, and execs `path` into it. The caller enters user
    /// mode with the returned entry. On failure no record is left behind.
    pub fn run_program<A: AsRef<[u8]>>(
        &self,
        path: &str,
        args: &[A],
    ) -> ProcResult<(Pid, UserEntry)> {
        let mut files = FileTable::new(self.config.open_max);
        if self.config.console_stdio {
            files.attach_console(&*self.platform)?;
        }

        let process = self
            .table
            .allocate(|pid| Process::new(pid, Pid::KERNEL, path.to_string(), None, files))?;
        let pid = process.pid();
        process.set_thread(self.platform.current_thread());

        let args: Vec<Vec<u8>> = args.iter().map(|arg| arg.as_ref().to_vec()).collect();
        match self.exec_image(&process, path.as_bytes(), &args) {
            Ok(entry) => {
                log::info!("[PROC] Launched {} as PID {}", path, pid);
                Ok((pid, entry))
            }
            Err(err) => {
                log::warn!("[PROC] Failed to launch {}: {}", path, err);
                self.table.remove(pid);
                Err(err.error())
            }
        }
    }

    /// Number of records in the table, root and zombies included.
    pub fn process_count(&self) -> usize {
        self.table.count()
    }

    pub fn snapshot(&self) -> Vec<ProcessSnapshot> {
        self.table.snapshot()
    }
}

static MANAGER: Once<ProcessManager> = Once::new();

/// Create the global process manager. Later calls return the first one.
pub fn init(platform: Arc<dyn Platform>, config: ProcConfig) -> &'static ProcessManager {
    MANAGER.call_once(|| ProcessManager::new(platform, config))
}

/// The global process manager, once [`init`] has run.
pub fn get() -> Option<&'static ProcessManager> {
    MANAGER.get()
}
