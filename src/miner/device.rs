// src/miner/device.rs
//! Device controller
//!
//! One controller owns one compute device for the lifetime of its worker
//! thread. Every iteration it:
//! 1. adopts the newest work template, if any (blocking only before the first)
//! 2. advances its extraNonce cursor and rolls the timestamp
//! 3. rebuilds the precomputation block and runs one kernel scan
//! 4. harvests the candidates and forwards them to the collector
//!
//! Everything here except [`DeviceStats`] is private to the worker thread.

use crate::miner::collector::Candidate;
use crate::miner::kernel::{ComputeKernel, DeviceInfo, LaunchConfig, MAX_CANDIDATES, ResultBuffer, ScanParams};
use crate::stats::DeviceStats;
use crate::utils::clock::Clock;
use crate::utils::error::MinerError;
use crate::utils::shutdown::ShutdownSignal;
use crate::work::{
    BLOCK_WORDS, ExtraNonce, HEADER_PREFIX_LEN, HEADER_TAIL_WORDS, NONCE1_WORD, NONCE2_WORD,
    TIMESTAMP_WORD, WORK_DATA_LEN, WorkSubscription, WorkTemplate, swap_endianness, word_offset,
};
use crossbeam_channel::{Receiver, Sender, select};
use std::sync::Arc;
use std::time::Instant;

/// Pre-filter threshold handed to the kernel; final validation happens later
pub const TARGET_ACCEPT_ALL: u32 = u32::MAX;

/// Builds the 192-byte precomputation block
///
/// The header prefix is copied verbatim and the header words that follow
/// it are written big-endian. The trailing padding stays zero.
pub fn assemble_block(
    data: &[u8; WORK_DATA_LEN],
    words: &[u32; BLOCK_WORDS],
) -> [u8; WORK_DATA_LEN] {
    let mut block = [0u8; WORK_DATA_LEN];
    block[..HEADER_PREFIX_LEN].copy_from_slice(&data[..HEADER_PREFIX_LEN]);
    for (j, word) in words.iter().take(HEADER_TAIL_WORDS).enumerate() {
        let at = word_offset(j);
        block[at..at + 4].copy_from_slice(&word.to_be_bytes());
    }
    block
}

/// Channels and shared handles a controller is wired to
pub struct ControllerLinks {
    /// Inbound work templates
    pub work: WorkSubscription,
    /// Outbound candidates
    pub candidates: Sender<Candidate>,
    /// Cancellation
    pub shutdown: ShutdownSignal,
    /// Counters shared with the collector and the reporter
    pub stats: Arc<DeviceStats>,
    /// Wall clock for timestamp rolling
    pub clock: Arc<dyn Clock>,
}

/// Mining loop state for one device
pub struct DeviceController {
    ordinal: u8,
    info: DeviceInfo,
    launch: LaunchConfig,
    extra_nonce: ExtraNonce,
    current_work_id: u32,
    last_block: [u32; BLOCK_WORDS],
    work: Option<Arc<WorkTemplate>>,
    results: ResultBuffer,
    links: ControllerLinks,
}

impl DeviceController {
    /// Creates the controller for the device holding `ordinal`
    ///
    /// The extraNonce high byte is fixed to the ordinal here and never
    /// changes afterwards.
    pub fn new(ordinal: u8, info: DeviceInfo, launch: LaunchConfig, links: ControllerLinks) -> Self {
        let extra_nonce = ExtraNonce::for_ordinal(ordinal);
        let mut last_block = [0u32; BLOCK_WORDS];
        last_block[NONCE1_WORD] = swap_endianness(extra_nonce.value());

        DeviceController {
            ordinal,
            info,
            launch,
            extra_nonce,
            current_work_id: 0,
            last_block,
            work: None,
            results: ResultBuffer::new(),
            links,
        }
    }

    /// Device ordinal
    pub fn ordinal(&self) -> u8 {
        self.ordinal
    }

    /// Current extraNonce
    pub fn extra_nonce(&self) -> ExtraNonce {
        self.extra_nonce
    }

    /// ID of the template being scanned, 0 before the first one
    pub fn current_work_id(&self) -> u32 {
        self.current_work_id
    }

    /// Working words in the kernel's byte order
    pub fn last_block(&self) -> &[u32; BLOCK_WORDS] {
        &self.last_block
    }

    /// Host-order timestamp programmed for the current scan
    pub fn timestamp(&self) -> u32 {
        swap_endianness(self.last_block[TIMESTAMP_WORD])
    }

    /// Drives the device until cancellation or a device-fatal error
    ///
    /// The kernel is released on every exit path.
    pub fn run(&mut self, kernel: &mut dyn ComputeKernel) -> Result<(), MinerError> {
        log::info!(
            "Started device #{}: {} (extraNonce {})",
            self.info.index,
            self.info.name,
            self.extra_nonce
        );

        let result = self.mine(kernel);
        kernel.release();

        log::debug!("Device #{}: released", self.info.index);
        result
    }

    fn mine(&mut self, kernel: &mut dyn ComputeKernel) -> Result<(), MinerError> {
        loop {
            if !self.update_current_work() {
                return Ok(());
            }

            if self.links.shutdown.is_triggered() {
                return Ok(());
            }

            let found = self.scan(kernel)?;

            // Results of a scan that straddled cancellation are dropped.
            if self.links.shutdown.is_triggered() {
                return Ok(());
            }

            self.harvest(found)?;
        }
    }

    /// Adopts new work
    ///
    /// Without any work yet this blocks until the first template or
    /// cancellation arrives. Otherwise it only drains what is already
    /// queued and keeps the newest template.
    ///
    /// # Returns
    /// `false` if the loop must stop
    pub fn update_current_work(&mut self) -> bool {
        let newest = if self.work.is_some() {
            self.links.work.try_iter().last()
        } else {
            let work: &Receiver<Arc<WorkTemplate>> = &self.links.work;
            let quit = self.links.shutdown.receiver();
            select! {
                recv(work) -> msg => match msg {
                    Ok(template) => Some(template),
                    Err(_) => {
                        log::warn!("Device #{}: work source closed before any work", self.info.index);
                        return false;
                    }
                },
                recv(quit) -> _ => return false,
            }
        };

        if let Some(template) = newest {
            self.adopt(template);
        }
        true
    }

    fn adopt(&mut self, template: Arc<WorkTemplate>) {
        self.current_work_id = self.current_work_id.wrapping_add(1);

        self.last_block = template.block_words();
        self.last_block[NONCE1_WORD] = swap_endianness(self.extra_nonce.value());
        self.last_block[NONCE2_WORD] = swap_endianness(self.current_work_id);
        self.work = Some(template);

        self.links.stats.record_work(self.current_work_id);
        log::debug!(
            "Device #{}: adopted work {:08x}",
            self.info.index,
            self.current_work_id
        );
    }

    /// Advances the extraNonce cursor within this device's shard
    pub fn advance_nonce(&mut self) {
        self.extra_nonce.rollover();
        self.last_block[NONCE1_WORD] = swap_endianness(self.extra_nonce.value());
    }

    /// Programs the timestamp for a scan happening at `now`
    ///
    /// # Returns
    /// The host-order timestamp, or `None` without work
    pub fn roll_timestamp(&mut self, now: u32) -> Option<u32> {
        let ts = self.work.as_ref()?.scan_timestamp(now);
        self.last_block[TIMESTAMP_WORD] = swap_endianness(ts);
        Some(ts)
    }

    /// Precomputation block for the current words
    pub fn precompute_block(&self) -> Option<[u8; WORK_DATA_LEN]> {
        let work = self.work.as_ref()?;
        Some(assemble_block(&work.data, &self.last_block))
    }

    /// Runs one kernel scan
    ///
    /// # Returns
    /// Number of candidates now present in the host result buffer
    pub fn scan(&mut self, kernel: &mut dyn ComputeKernel) -> Result<usize, MinerError> {
        self.advance_nonce();
        self.roll_timestamp(self.links.clock.unix_now())
            .ok_or_else(|| MinerError::WorkError("scan requested without work".into()))?;

        let block = self
            .precompute_block()
            .ok_or_else(|| MinerError::WorkError("scan requested without work".into()))?;
        kernel.precompute(&block)?;

        // Only the count slot is reset; stale candidate slots are never read.
        self.results.set_count(0);
        kernel.copy_to_device(&self.results, 0..1)?;

        let params = ScanParams {
            grid: self.launch.grid,
            block: self.launch.block,
            threads: self.launch.throughput,
            start_nonce: self.extra_nonce.value(),
            target_high: TARGET_ACCEPT_ALL,
        };

        let started = Instant::now();
        kernel.scan(&params)?;

        // Copy the count first; the candidate slots only when there are any.
        kernel.copy_from_device(&mut self.results, 0..1)?;
        let reported = self.results.count() as usize;
        let found = reported.min(MAX_CANDIDATES);
        if reported > MAX_CANDIDATES {
            log::warn!(
                "Device #{}: kernel reported {} results, buffer holds {}",
                self.info.index,
                reported,
                MAX_CANDIDATES
            );
        }
        if found > 0 {
            kernel.copy_from_device(&mut self.results, 1..1 + found)?;
        }

        self.links.stats.record_scan(self.launch.throughput);
        log::trace!(
            "Device #{}: kernel execution to read time: {:?}",
            self.info.index,
            started.elapsed()
        );
        Ok(found)
    }

    /// Forwards the first `found` result slots to the collector
    pub fn harvest(&self, found: usize) -> Result<usize, MinerError> {
        let Some(work) = &self.work else {
            return Ok(0);
        };

        let timestamp = self.timestamp();
        let candidates = self.results.candidates(found);
        for (i, &nonce) in candidates.iter().enumerate() {
            log::debug!(
                "Device #{}: found candidate {} nonce {:08x}, extraNonce {}, workID {:08x}, timestamp {:08x}",
                self.info.index,
                i,
                nonce,
                self.extra_nonce,
                self.current_work_id,
                timestamp
            );

            self.links.candidates.send(Candidate {
                ordinal: self.ordinal,
                nonce,
                extra_nonce: self.extra_nonce.value(),
                work_id: self.current_work_id,
                timestamp,
                template: work.clone(),
            })?;
        }
        Ok(candidates.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::shutdown::Shutdown;
    use crate::work::{HEADER_LEN, NONCE0_WORD, WorkDispatcher};
    use std::collections::VecDeque;
    use std::ops::Range;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct ManualClock(AtomicU32);

    impl Clock for ManualClock {
        fn unix_now(&self) -> u32 {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    struct Trace {
        params: Vec<ScanParams>,
        blocks: Vec<[u8; WORK_DATA_LEN]>,
        downloads: Vec<Range<usize>>,
        uploads: Vec<Range<usize>>,
        released: bool,
    }

    /// Kernel replaying scripted result counts
    struct ScriptedKernel {
        script: VecDeque<Result<u32, MinerError>>,
        device: ResultBuffer,
        trace: Arc<Mutex<Trace>>,
        on_scan: Option<Box<dyn FnMut() + Send>>,
    }

    impl ScriptedKernel {
        fn new(script: Vec<Result<u32, MinerError>>) -> (Self, Arc<Mutex<Trace>>) {
            let trace = Arc::new(Mutex::new(Trace::default()));
            (
                ScriptedKernel {
                    script: script.into(),
                    device: ResultBuffer::new(),
                    trace: trace.clone(),
                    on_scan: None,
                },
                trace,
            )
        }
    }

    impl ComputeKernel for ScriptedKernel {
        fn precompute(&mut self, block: &[u8; WORK_DATA_LEN]) -> Result<(), MinerError> {
            self.trace.lock().unwrap().blocks.push(*block);
            Ok(())
        }

        fn copy_to_device(&mut self, host: &ResultBuffer, slots: Range<usize>) -> Result<(), MinerError> {
            self.trace.lock().unwrap().uploads.push(slots.clone());
            self.device.copy_slots_from(host, slots)
        }

        fn scan(&mut self, params: &ScanParams) -> Result<(), MinerError> {
            self.trace.lock().unwrap().params.push(*params);
            if let Some(hook) = self.on_scan.as_mut() {
                hook();
            }
            let count = self.script.pop_front().unwrap_or(Ok(0))?;
            for i in 0..(count as usize).min(MAX_CANDIDATES) {
                self.device.slots_mut()[1 + i] = params.start_nonce.wrapping_add(i as u32 * 7);
            }
            let current = self.device.count();
            self.device.set_count(current + count);
            Ok(())
        }

        fn copy_from_device(&mut self, host: &mut ResultBuffer, slots: Range<usize>) -> Result<(), MinerError> {
            self.trace.lock().unwrap().downloads.push(slots.clone());
            host.copy_slots_from(&self.device, slots)
        }

        fn release(&mut self) {
            self.trace.lock().unwrap().released = true;
        }
    }

    struct Harness {
        dispatcher: WorkDispatcher,
        shutdown: Shutdown,
        candidates: Receiver<Candidate>,
        clock: Arc<ManualClock>,
        stats: Arc<DeviceStats>,
    }

    fn controller(ordinal: u8, now: u32) -> (DeviceController, Harness) {
        let dispatcher = WorkDispatcher::new();
        let shutdown = Shutdown::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        let clock = Arc::new(ManualClock(AtomicU32::new(now)));
        let info = DeviceInfo {
            index: ordinal as usize,
            name: "scripted".into(),
        };
        let stats = Arc::new(DeviceStats::new(ordinal, info.clone()));
        let links = ControllerLinks {
            work: dispatcher.subscribe(),
            candidates: tx,
            shutdown: shutdown.signal(),
            stats: stats.clone(),
            clock: clock.clone(),
        };
        let launch = LaunchConfig::default();
        (
            DeviceController::new(ordinal, info, launch, links),
            Harness {
                dispatcher,
                shutdown,
                candidates: rx,
                clock,
                stats,
            },
        )
    }

    fn template(job_time: u32, received: u32) -> WorkTemplate {
        let mut header = [0x5au8; HEADER_LEN];
        header[136..140].copy_from_slice(&job_time.to_le_bytes());
        WorkTemplate::solo(&header, [0xff; 32], received).unwrap()
    }

    #[test]
    fn ordinal_fixed_in_high_byte() {
        let (mut c, _h) = controller(2, 0);
        assert_eq!(c.extra_nonce().value(), 0x0200_0000);
        for _ in 0..10 {
            c.advance_nonce();
        }
        assert_eq!(c.extra_nonce().value(), 0x0200_000a);
        assert_eq!(
            c.last_block()[NONCE1_WORD],
            swap_endianness(0x0200_000a)
        );
    }

    #[test]
    fn assembly_is_idempotent() {
        let (mut c, h) = controller(3, 1000);
        let t = h.dispatcher.dispatch(template(1000, 1000));
        assert!(c.update_current_work());
        c.advance_nonce();
        c.roll_timestamp(1234).unwrap();
        let first = c.precompute_block().unwrap();

        // Replay the same state from scratch on the same template.
        c.extra_nonce = ExtraNonce::for_ordinal(3);
        c.current_work_id = 0;
        c.adopt(t.clone());
        c.advance_nonce();
        c.roll_timestamp(1234).unwrap();
        let second = c.precompute_block().unwrap();

        assert_eq!(first, second);
        assert_eq!(&first[..HEADER_PREFIX_LEN], &t.data[..HEADER_PREFIX_LEN]);
        assert_eq!(&first[136..140], &1234u32.to_le_bytes());
        assert_eq!(&first[144..148], &0x0300_0001u32.to_le_bytes());
        assert_eq!(&first[148..152], &1u32.to_le_bytes());
        assert_eq!(&first[180..], &[0u8; 12]);

        // A different cursor must change the block.
        c.advance_nonce();
        assert_ne!(c.precompute_block().unwrap(), first);
    }

    #[test]
    fn adoption_bumps_work_id_and_keeps_newest() {
        let (mut c, h) = controller(1, 0);
        h.dispatcher.dispatch(template(10, 0));
        assert!(c.update_current_work());
        assert_eq!(c.current_work_id(), 1);

        // Nothing new: no bump.
        assert!(c.update_current_work());
        assert_eq!(c.current_work_id(), 1);

        h.dispatcher.dispatch(template(20, 0));
        h.dispatcher.dispatch(template(30, 0));
        assert!(c.update_current_work());
        assert_eq!(c.current_work_id(), 2);
        assert_eq!(c.last_block()[NONCE2_WORD], swap_endianness(2));
        assert_eq!(c.roll_timestamp(0), Some(30));
        assert_eq!(h.stats.snapshot().work_id, 2);
    }

    #[test]
    fn blocks_until_first_work() {
        let (mut c, h) = controller(0, 0);
        let dispatcher = Arc::new(h.dispatcher);
        let feeder = {
            let dispatcher = dispatcher.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(30));
                dispatcher.dispatch(template(5, 0));
            })
        };

        let started = Instant::now();
        assert!(c.update_current_work());
        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(c.current_work_id(), 1);
        feeder.join().unwrap();
    }

    #[test]
    fn cancellation_interrupts_wait_for_first_work() {
        let (mut c, h) = controller(0, 0);
        h.shutdown.trigger();
        assert!(!c.update_current_work());
        assert_eq!(c.current_work_id(), 0);
    }

    #[test]
    fn solo_timestamp_follows_clock() {
        let (mut c, h) = controller(2, 1000);
        h.dispatcher.dispatch(template(1000, 1000));
        assert!(c.update_current_work());

        h.clock.0.store(1007, Ordering::SeqCst);
        let (mut kernel, trace) = ScriptedKernel::new(vec![Ok(0)]);
        c.scan(&mut kernel).unwrap();

        assert_eq!(c.timestamp(), 1007);
        assert_eq!(c.last_block()[TIMESTAMP_WORD], swap_endianness(1007));
        let block = trace.lock().unwrap().blocks[0];
        assert_eq!(&block[136..140], &1007u32.to_le_bytes());
        assert_eq!(c.extra_nonce().ordinal(), 2);
    }

    #[test]
    fn pool_timestamp_is_fixed() {
        let (mut c, h) = controller(0, 100);
        let mut header = [0u8; HEADER_LEN];
        header[136..140].copy_from_slice(&5000u32.to_le_bytes());
        h.dispatcher
            .dispatch(WorkTemplate::pool(&header, [0xff; 32], 100).unwrap());
        assert!(c.update_current_work());

        h.clock.0.store(10_000, Ordering::SeqCst);
        let (mut kernel, _) = ScriptedKernel::new(vec![Ok(0)]);
        c.scan(&mut kernel).unwrap();
        assert_eq!(c.timestamp(), 5000);
    }

    #[test]
    fn scan_programs_kernel() {
        let (mut c, h) = controller(3, 0);
        h.dispatcher.dispatch(template(0, 0));
        assert!(c.update_current_work());

        let (mut kernel, trace) = ScriptedKernel::new(vec![Ok(0)]);
        assert_eq!(c.scan(&mut kernel).unwrap(), 0);

        let trace = trace.lock().unwrap();
        let params = trace.params[0];
        assert_eq!(params.start_nonce, 0x0300_0001);
        assert_eq!(params.threads, 0x2000_0000);
        assert_eq!(params.grid, 52428);
        assert_eq!(params.block, 640);
        assert_eq!(params.target_high, TARGET_ACCEPT_ALL);
        assert_eq!(trace.uploads, vec![0..1]);
        // No candidates: only the count slot comes back.
        assert_eq!(trace.downloads, vec![0..1]);
        // The nonce word of the block is left as the template had it.
        assert_eq!(&trace.blocks[0][140..144], &[0x5a; 4]);
        assert_eq!(NONCE0_WORD, 3);
        assert_eq!(h.stats.snapshot().scans, 1);
    }

    #[test]
    fn harvest_emits_exactly_count_candidates() {
        let (mut c, h) = controller(1, 50);
        h.dispatcher.dispatch(template(50, 50));
        assert!(c.update_current_work());

        let (mut kernel, trace) = ScriptedKernel::new(vec![Ok(0), Ok(3)]);
        let found = c.scan(&mut kernel).unwrap();
        assert_eq!(c.harvest(found).unwrap(), 0);
        assert!(h.candidates.try_recv().is_err());

        let found = c.scan(&mut kernel).unwrap();
        assert_eq!(found, 3);
        assert_eq!(c.harvest(found).unwrap(), 3);
        assert_eq!(trace.lock().unwrap().downloads.last(), Some(&(1..4)));

        let got: Vec<Candidate> = h.candidates.try_iter().collect();
        assert_eq!(got.len(), 3);
        for (i, cand) in got.iter().enumerate() {
            assert_eq!(cand.ordinal, 1);
            assert_eq!(cand.extra_nonce, 0x0100_0002);
            assert_eq!(cand.work_id, 1);
            assert_eq!(cand.timestamp, 50);
            assert_eq!(cand.nonce, 0x0100_0002 + 7 * i as u32);
        }
    }

    #[test]
    fn oversized_count_is_clamped() {
        let (mut c, h) = controller(0, 0);
        h.dispatcher.dispatch(template(0, 0));
        assert!(c.update_current_work());

        let (mut kernel, trace) = ScriptedKernel::new(vec![Ok(500)]);
        let found = c.scan(&mut kernel).unwrap();
        assert_eq!(found, MAX_CANDIDATES);
        assert_eq!(
            trace.lock().unwrap().downloads.last(),
            Some(&(1..1 + MAX_CANDIDATES))
        );
        assert_eq!(c.harvest(found).unwrap(), MAX_CANDIDATES);
        assert_eq!(h.candidates.try_iter().count(), MAX_CANDIDATES);
    }

    #[test]
    fn kernel_failure_is_fatal_and_releases() {
        let (mut c, h) = controller(0, 0);
        h.dispatcher.dispatch(template(0, 0));

        let (mut kernel, trace) =
            ScriptedKernel::new(vec![Ok(0), Err(MinerError::KernelError("launch failed".into()))]);
        let err = c.run(&mut kernel).unwrap_err();
        assert!(matches!(err, MinerError::KernelError(_)));
        assert!(trace.lock().unwrap().released);
        assert_eq!(trace.lock().unwrap().params.len(), 2);
    }

    #[test]
    fn no_candidates_after_cancellation() {
        let (mut c, h) = controller(0, 0);
        h.dispatcher.dispatch(template(0, 0));

        let (mut kernel, trace) = ScriptedKernel::new(vec![Ok(2), Ok(2), Ok(2)]);
        let shutdown = Arc::new(h.shutdown);
        let scans = Arc::new(AtomicU32::new(0));
        {
            let shutdown = shutdown.clone();
            let scans = scans.clone();
            // Cancellation lands while the second scan is in flight.
            kernel.on_scan = Some(Box::new(move || {
                if scans.fetch_add(1, Ordering::SeqCst) == 1 {
                    shutdown.trigger();
                }
            }));
        }

        c.run(&mut kernel).unwrap();
        assert_eq!(trace.lock().unwrap().params.len(), 2);
        assert!(trace.lock().unwrap().released);
        // Only the first scan's candidates were forwarded.
        assert_eq!(h.candidates.try_iter().count(), 2);
    }

    #[test]
    fn rollover_never_leaves_shard() {
        let (mut c, h) = controller(2, 1000);
        h.dispatcher.dispatch(template(1000, 1000));
        assert!(c.update_current_work());
        c.extra_nonce = ExtraNonce::from_raw(0x02FF_FFFE);

        let (mut kernel, trace) = ScriptedKernel::new(vec![Ok(0), Ok(0), Ok(0)]);
        for _ in 0..3 {
            c.scan(&mut kernel).unwrap();
        }
        let starts: Vec<u32> = trace
            .lock()
            .unwrap()
            .params
            .iter()
            .map(|p| p.start_nonce)
            .collect();
        assert_eq!(starts, vec![0x02FF_FFFF, 0x0200_0000, 0x0200_0001]);
    }
}
