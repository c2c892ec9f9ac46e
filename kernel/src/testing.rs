//! Host implementations of every platform seam, for tests.
//!
//! Execution units are std threads; blocking is park/unpark, whose wakeup
//! token gives the "wake before block is not lost" guarantee. Entering
//! user mode records the frame and parks the thread for good.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::Cell;
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::collections::HashMap;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::config::{CONSOLE_DEVICE, PAGE_SIZE, USER_STACK_TOP};
use crate::error::{ProcError, ProcResult};
use crate::loader::ProgramLoader;
use crate::memory::{AddressSpace, VirtualMemory};
use crate::process::{Pid, TrapFrame};
use crate::scheduler::{Scheduler, ThreadEntry, ThreadId};
use crate::vfs::{OpenFlags, Vfs, Vnode};

static NEXT_TID: AtomicU64 = AtomicU64::new(1000);

std::thread_local! {
    static CURRENT_TID: Cell<Option<ThreadId>> = const { Cell::new(None) };
}

fn park_forever() -> ! {
    loop {
        std::thread::park();
    }
}

/// Fault injection and accounting shared by a platform and its spaces.
#[derive(Default)]
struct SpaceShared {
    live: AtomicUsize,
    fail_duplicate: AtomicBool,
    fail_stack: AtomicBool,
}

/// Sparse byte-addressed user memory; pages appear on first write.
pub struct SparseSpace {
    pages: BTreeMap<u64, Box<[u8]>>,
    shared: Option<Arc<SpaceShared>>,
}

impl SparseSpace {
    pub fn new() -> Self {
        Self {
            pages: BTreeMap::new(),
            shared: None,
        }
    }

    fn tracked(shared: Arc<SpaceShared>) -> Self {
        shared.live.fetch_add(1, Ordering::SeqCst);
        Self {
            pages: BTreeMap::new(),
            shared: Some(shared),
        }
    }
}

impl Drop for SparseSpace {
    fn drop(&mut self) {
        if let Some(shared) = &self.shared {
            shared.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl AddressSpace for SparseSpace {
    fn duplicate(&self) -> ProcResult<Box<dyn AddressSpace>> {
        let mut copy = match &self.shared {
            Some(shared) => {
                if shared.fail_duplicate.swap(false, Ordering::SeqCst) {
                    return Err(ProcError::OutOfMemory);
                }
                SparseSpace::tracked(shared.clone())
            }
            None => SparseSpace::new(),
        };
        copy.pages = self.pages.clone();
        Ok(Box::new(copy))
    }

    fn activate(&self) {}

    fn define_stack(&mut self) -> ProcResult<u64> {
        match &self.shared {
            Some(shared) if shared.fail_stack.swap(false, Ordering::SeqCst) => {
                Err(ProcError::OutOfMemory)
            }
            _ => Ok(USER_STACK_TOP),
        }
    }

    fn copy_in(&self, uaddr: u64, buf: &mut [u8]) -> ProcResult<()> {
        for (i, byte) in buf.iter_mut().enumerate() {
            let addr = uaddr + i as u64;
            let page = self
                .pages
                .get(&(addr / PAGE_SIZE))
                .ok_or(ProcError::BadAddress)?;
            *byte = page[(addr % PAGE_SIZE) as usize];
        }
        Ok(())
    }

    fn copy_out(&mut self, uaddr: u64, data: &[u8]) -> ProcResult<()> {
        for (i, byte) in data.iter().enumerate() {
            let addr = uaddr + i as u64;
            let page = self
                .pages
                .entry(addr / PAGE_SIZE)
                .or_insert_with(|| alloc::vec![0u8; PAGE_SIZE as usize].into_boxed_slice());
            page[(addr % PAGE_SIZE) as usize] = *byte;
        }
        Ok(())
    }
}

/// Vnode that only counts how often it was closed.
pub struct MemVnode {
    name: String,
    closes: AtomicUsize,
}

impl MemVnode {
    pub fn new(name: &str) -> Arc<MemVnode> {
        Arc::new(MemVnode {
            name: name.to_string(),
            closes: AtomicUsize::new(0),
        })
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Vnode for MemVnode {
    fn name(&self) -> &str {
        &self.name
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Every seam, backed by the host.
pub struct HostPlatform {
    threads: Mutex<HashMap<ThreadId, std::thread::Thread>>,
    /// Frames handed to `enter_user_mode`, by thread name.
    entries: Mutex<Vec<(String, TrapFrame)>>,
    entered: Condvar,
    /// Program path -> entry point; `None` for an image the loader rejects.
    programs: Mutex<HashMap<String, Option<u64>>>,
    opened: Mutex<Vec<Arc<MemVnode>>>,
    spaces: Arc<SpaceShared>,
    fail_spawn: AtomicBool,
    fail_create: AtomicBool,
}

impl HostPlatform {
    pub fn new() -> Arc<HostPlatform> {
        Arc::new(HostPlatform {
            threads: Mutex::new(HashMap::new()),
            entries: Mutex::new(Vec::new()),
            entered: Condvar::new(),
            programs: Mutex::new(HashMap::new()),
            opened: Mutex::new(Vec::new()),
            spaces: Arc::new(SpaceShared::default()),
            fail_spawn: AtomicBool::new(false),
            fail_create: AtomicBool::new(false),
        })
    }

    pub fn install_program(&self, path: &str, entry: u64) {
        self.programs.lock().unwrap().insert(path.to_string(), Some(entry));
    }

    /// A program that opens but fails to load.
    pub fn install_corrupt_program(&self, path: &str) {
        self.programs.lock().unwrap().insert(path.to_string(), None);
    }

    pub fn fail_next_spawn(&self) {
        self.fail_spawn.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_duplicate(&self) {
        self.spaces.fail_duplicate.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_stack(&self) {
        self.spaces.fail_stack.store(true, Ordering::SeqCst);
    }

    /// Address spaces created by this platform and not yet dropped.
    pub fn live_spaces(&self) -> usize {
        self.spaces.live.load(Ordering::SeqCst)
    }

    /// Console vnodes opened and not yet closed.
    pub fn console_open_count(&self) -> usize {
        self.opened
            .lock()
            .unwrap()
            .iter()
            .filter(|vnode| vnode.name() == CONSOLE_DEVICE && vnode.close_count() == 0)
            .count()
    }

    /// Vnodes opened under `path` and not yet closed.
    pub fn open_count(&self, path: &str) -> usize {
        self.opened
            .lock()
            .unwrap()
            .iter()
            .filter(|vnode| vnode.name() == path && vnode.close_count() == 0)
            .count()
    }

    /// Wait until the thread running `pid` has entered user mode.
    pub fn wait_for_entry(&self, pid: Pid) -> Option<TrapFrame> {
        let name = std::format!("pid {}", pid);
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut entries = self.entries.lock().unwrap();
        loop {
            if let Some((_, frame)) = entries.iter().find(|(n, _)| *n == name) {
                return Some(*frame);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            entries = self.entered.wait_timeout(entries, deadline - now).unwrap().0;
        }
    }
}

impl Scheduler for HostPlatform {
    fn current_thread(&self) -> ThreadId {
        let tid = CURRENT_TID.with(|cell| match cell.get() {
            Some(tid) => tid,
            None => {
                let tid = ThreadId(NEXT_TID.fetch_add(1, Ordering::SeqCst));
                cell.set(Some(tid));
                tid
            }
        });
        self.threads
            .lock()
            .unwrap()
            .entry(tid)
            .or_insert_with(std::thread::current);
        tid
    }

    fn spawn_thread(&self, name: &str, entry: ThreadEntry) -> ProcResult<ThreadId> {
        if self.fail_spawn.swap(false, Ordering::SeqCst) {
            return Err(ProcError::OutOfMemory);
        }
        let tid = ThreadId(NEXT_TID.fetch_add(1, Ordering::SeqCst));
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                CURRENT_TID.with(|cell| cell.set(Some(tid)));
                entry();
            })
            .map_err(|_| ProcError::OutOfMemory)?;
        self.threads
            .lock()
            .unwrap()
            .insert(tid, handle.thread().clone());
        Ok(tid)
    }

    fn block_current(&self) {
        std::thread::park();
    }

    fn wake(&self, thread: ThreadId) {
        if let Some(handle) = self.threads.lock().unwrap().get(&thread) {
            handle.unpark();
        }
    }

    fn exit_thread(&self) -> ! {
        park_forever()
    }

    fn enter_user_mode(&self, frame: TrapFrame) -> ! {
        let name = std::thread::current().name().unwrap_or("").to_string();
        self.entries.lock().unwrap().push((name, frame));
        self.entered.notify_all();
        park_forever()
    }
}

impl VirtualMemory for HostPlatform {
    fn create_address_space(&self) -> ProcResult<Box<dyn AddressSpace>> {
        if self.fail_create.swap(false, Ordering::SeqCst) {
            return Err(ProcError::OutOfMemory);
        }
        Ok(Box::new(SparseSpace::tracked(self.spaces.clone())))
    }
}

impl Vfs for HostPlatform {
    fn open(&self, path: &str, _flags: OpenFlags) -> ProcResult<Arc<dyn Vnode>> {
        if path != CONSOLE_DEVICE && !self.programs.lock().unwrap().contains_key(path) {
            return Err(ProcError::NotFound);
        }
        let vnode = MemVnode::new(path);
        self.opened.lock().unwrap().push(vnode.clone());
        Ok(vnode)
    }
}

impl ProgramLoader for HostPlatform {
    fn load_elf(&self, vnode: &dyn Vnode, space: &mut dyn AddressSpace) -> ProcResult<u64> {
        let entry = self
            .programs
            .lock()
            .unwrap()
            .get(vnode.name())
            .copied()
            .flatten()
            .ok_or(ProcError::Loader)?;
        // Something to find at the entry point.
        space.copy_out(entry, &[0x0f, 0x05])?;
        Ok(entry)
    }
}
