//! PID selection and filter-token bookkeeping (component C2).
//!
//! The gateway core never decides *which* PIDs to deliver on its own; it
//! only tracks the set requested by the client and reconciles that set
//! against whatever filters are currently open on the device. The actual
//! open/close mechanics (installing a PES filter on a demux, or doing
//! nothing at all for a child-process source) are supplied by the caller
//! as closures, matching the two very different `Device` backends.
//!
//! `add_data` also watches the PAT and PMT as they stream past, so the
//! PCR PID that drives read pacing is discovered automatically rather
//! than requiring a transport parameter that SAT>IP's grammar has no
//! room for.

use std::time::Instant;

/// Number of distinct 13-bit PIDs in an MPEG-TS multiplex.
pub const PID_COUNT: usize = 8192;

/// The reserved null PID, used to pad/blank filtered-out packets.
pub const NULL_PID: u16 = 0x1FFF;

/// The PAT's fixed PID, watched so the PMT (and through it the PCR PID)
/// can be discovered without any client-supplied parameter for it.
const PAT_PID: u16 = 0x0000;

/// PCR field absent marker used by the 42-bit PCR base.
const PCR_BASE_MASK: u64 = (1u64 << 33) - 1;

/// Upper bound on `pcr_delta_us`: a sample this stale (or a wall-clock
/// fallback this large) is not a broadcast cadence worth pacing reads to,
/// and used unclamped as a sleep target it would stall the read loop.
const MAX_PCR_DELTA_US: u32 = 500_000;

#[derive(Debug, Clone)]
struct PidEntry<T> {
    used: bool,
    token: Option<T>,
    packet_count: u64,
    /// Set when this PID was last seen carrying the PMT (as discovered
    /// from the PAT), independent of whether it is also client-selected.
    is_pmt: bool,
    /// Set when this PID was last designated as the PCR source (as
    /// discovered from the PMT's `PCR_PID` field).
    pcr_source: bool,
}

// `#[derive(Default)]` would add a spurious `T: Default` bound on every
// caller (`Option<T>` is `Default` regardless of `T`), which real device
// tokens (e.g. `DmxDevice`) don't implement.
impl<T> Default for PidEntry<T> {
    fn default() -> Self {
        PidEntry {
            used: false,
            token: None,
            packet_count: 0,
            is_pmt: false,
            pcr_source: false,
        }
    }
}

/// Tracks which PIDs are currently selected, which of them have a live
/// filter token, and the most recent PCR sample for pacing.
#[derive(Debug)]
pub struct FilterData<T> {
    entries: Vec<PidEntry<T>>,
    changed: bool,
    /// PMT PID most recently discovered from the PAT; `None` until a PAT
    /// packet naming a program has been observed.
    pmt_pid: Option<u16>,
    pcr_pid: Option<u16>,
    last_pcr: Option<u64>,
    last_pcr_at: Option<Instant>,
    pcr_delta_us: u32,
    /// Leftover-time hint consulted by `Device::is_data_available`'s
    /// ChildPipe pacing branch; see the struct-level docs on why it is
    /// distinct from `pcr_delta_us`.
    pcr_timer: u32,
}

impl<T> Default for FilterData<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FilterData<T> {
    pub fn new() -> Self {
        FilterData {
            entries: (0..PID_COUNT).map(|_| PidEntry::default()).collect(),
            changed: false,
            pmt_pid: None,
            pcr_pid: None,
            last_pcr: None,
            last_pcr_at: None,
            pcr_delta_us: 0,
            pcr_timer: 0,
        }
    }

    #[inline]
    pub fn has_changed(&self) -> bool {
        self.changed
    }

    #[inline]
    pub fn reset_changed(&mut self) {
        self.changed = false;
    }

    #[inline]
    pub fn is_used(&self, pid: u16) -> bool {
        self.entries[pid as usize & 0x1FFF].used
    }

    /// Marks a single PID as selected or deselected. A PID added with an
    /// open filter token, or removed while one is open, flips `changed`.
    pub fn set_used(&mut self, pid: u16, used: bool) {
        let entry = &mut self.entries[pid as usize & 0x1FFF];
        if entry.used != used {
            entry.used = used;
            self.changed = true;
        }
    }

    /// Selects every PID (the `pids=all` SAT>IP token).
    pub fn select_all(&mut self) {
        for entry in self.entries.iter_mut() {
            if !entry.used {
                self.changed = true;
            }
            entry.used = true;
        }
    }

    /// Deselects every PID (the `pids=none` SAT>IP token).
    pub fn select_none(&mut self) {
        for entry in self.entries.iter_mut() {
            if entry.used {
                self.changed = true;
            }
            entry.used = false;
        }
    }

    /// Parses a comma-separated PID list such as `"100,256,257"` and
    /// selects exactly that set, clearing every PID not mentioned.
    pub fn set_pids_csv(&mut self, csv: &str) -> Result<(), std::num::ParseIntError> {
        let mut wanted = [false; PID_COUNT];
        for token in csv.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let pid: u16 = token.parse()?;
            wanted[pid as usize & 0x1FFF] = true;
        }
        for (pid, want) in wanted.iter().enumerate() {
            self.set_used(pid as u16, *want);
        }
        Ok(())
    }

    /// Parses an `addpids=` / `delpids=` comma-separated PID list, applying
    /// `used` to each listed PID without touching the rest.
    pub fn apply_pids_csv(&mut self, csv: &str, used: bool) -> Result<(), std::num::ParseIntError> {
        for token in csv.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let pid: u16 = token.parse()?;
            self.set_used(pid, used);
        }
        Ok(())
    }

    /// Returns the selected PIDs as a sorted comma-separated list, or
    /// `"none"` when nothing is selected.
    pub fn pids_csv(&self) -> String {
        let selected: Vec<String> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.used)
            .map(|(pid, _)| pid.to_string())
            .collect();
        if selected.is_empty() {
            "none".to_owned()
        } else {
            selected.join(",")
        }
    }

    /// Designates which PID carries the PCR used for read-pacing. Passing
    /// `None` disables PCR-based pacing until a new source is chosen.
    pub fn set_pcr_pid(&mut self, pid: Option<u16>) {
        self.pcr_pid = pid;
        self.last_pcr = None;
        self.last_pcr_at = None;
    }

    #[inline]
    pub fn pcr_pid(&self) -> Option<u16> {
        self.pcr_pid
    }

    /// PMT PID most recently discovered from the PAT, if any.
    #[inline]
    pub fn pmt_pid(&self) -> Option<u16> {
        self.pmt_pid
    }

    /// Whether `pid` was last seen carrying the PMT.
    #[inline]
    pub fn is_pmt(&self, pid: u16) -> bool {
        self.entries[pid as usize & 0x1FFF].is_pmt
    }

    /// Whether `pid` is the currently designated PCR source.
    #[inline]
    pub fn is_pcr_source(&self, pid: u16) -> bool {
        self.entries[pid as usize & 0x1FFF].pcr_source
    }

    /// Updates the discovered PMT PID, moving the `is_pmt` flag off the
    /// previous one if the program's PMT moved.
    fn set_pmt_pid(&mut self, pid: u16) {
        if self.pmt_pid != Some(pid) {
            if let Some(old) = self.pmt_pid {
                self.entries[old as usize & 0x1FFF].is_pmt = false;
            }
            self.entries[pid as usize & 0x1FFF].is_pmt = true;
            self.pmt_pid = Some(pid);
        }
    }

    /// Watches the PAT and, once its PMT is known, the PMT itself, to
    /// discover the PCR PID without requiring the client to name it
    /// explicitly. A stream with no PAT/PMT (or whose PMT never changes)
    /// leaves any PCR PID set by `set_pcr_pid` untouched.
    fn observe_psi(&mut self, pid: u16, packet: &[u8]) {
        if pid == PAT_PID {
            if let Some(pmt_pid) = parse_pat_pmt_pid(packet) {
                self.set_pmt_pid(pmt_pid);
            }
        } else if Some(pid) == self.pmt_pid {
            if let Some(pcr_pid) = parse_pmt_pcr_pid(packet) {
                if self.pcr_pid != Some(pcr_pid) {
                    if let Some(old) = self.pcr_pid {
                        self.entries[old as usize & 0x1FFF].pcr_source = false;
                    }
                    self.entries[pcr_pid as usize & 0x1FFF].pcr_source = true;
                    self.set_pcr_pid(Some(pcr_pid));
                }
            }
        }
    }

    /// Most recent inter-PCR interval observed, in microseconds.
    #[inline]
    pub fn pcr_delta_us(&self) -> u32 {
        self.pcr_delta_us
    }

    /// Leftover-time hint consulted by the ChildPipe pacing branch of
    /// `is_data_available`. Never advanced internally by `FilterData`
    /// itself; a `Device` backend may adjust it to reflect time already
    /// spent waiting before a read attempt.
    #[inline]
    pub fn pcr_timer(&self) -> u32 {
        self.pcr_timer
    }

    pub fn set_pcr_timer(&mut self, value: u32) {
        self.pcr_timer = value;
    }

    /// Number of packets observed on `pid` since the table was created,
    /// counted before any null-PID rewrite.
    #[inline]
    pub fn packet_count(&self, pid: u16) -> u64 {
        self.entries[pid as usize & 0x1FFF].packet_count
    }

    /// Sum of every per-PID counter; equals the number of packets ever
    /// passed to `add_data`.
    pub fn total_packet_count(&self) -> u64 {
        self.entries.iter().map(|e| e.packet_count).sum()
    }

    /// Reconciles open filter tokens against the selected-PID set.
    ///
    /// For every PID marked used with no token, calls `open` and records
    /// whatever it returns (a `None` result is treated as "try again next
    /// time"). For every PID marked unused that still has a token, calls
    /// `close` and drops it. Already-consistent PIDs are left untouched,
    /// so calling this twice in a row with nothing changed in between is a
    /// no-op on the second call.
    pub fn update_pid_filters<O, C>(&mut self, mut open: O, mut close: C)
    where
        O: FnMut(u16) -> Option<T>,
        C: FnMut(u16, T),
    {
        for (pid, entry) in self.entries.iter_mut().enumerate() {
            let pid = pid as u16;
            if entry.used && entry.token.is_none() {
                entry.token = open(pid);
            } else if !entry.used {
                if let Some(token) = entry.token.take() {
                    close(pid, token);
                }
            }
        }
    }

    /// Closes every open filter token unconditionally, without touching
    /// the selected-PID set. Used when tearing down or retuning.
    pub fn close_active_pid_filters<C>(&mut self, mut close: C)
    where
        C: FnMut(u16, T),
    {
        for (pid, entry) in self.entries.iter_mut().enumerate() {
            if let Some(token) = entry.token.take() {
                close(pid as u16, token);
            }
        }
    }

    /// Feeds one 188-byte transport packet through the PID filter: PIDs not
    /// in the selected set are rewritten in place to the null PID, leaving
    /// every other byte (including the continuity counter) untouched. Also
    /// updates PCR pacing state when the packet belongs to the PCR PID and
    /// carries a PCR field.
    ///
    /// `apply_filter` should be `false` for a backend (DVB demux) that
    /// already restricts the DVR stream to the selected PIDs at the kernel
    /// level; it is meaningful only for backends (child-process sources)
    /// that hand back the full, unfiltered multiplex.
    pub fn add_data(&mut self, packet: &mut [u8], apply_filter: bool) {
        if packet.len() < 4 {
            return;
        }

        let pid = (((packet[1] & 0x1F) as u16) << 8) | packet[2] as u16;
        self.entries[pid as usize & 0x1FFF].packet_count += 1;

        // PSI is observed unconditionally, independent of `apply_filter`
        // and of whether the PAT/PMT PID is itself client-selected: PCR
        // pacing needs the PCR PID regardless of what is being delivered.
        self.observe_psi(pid, packet);

        if apply_filter && !self.is_used(pid) {
            packet[1] = (packet[1] & 0xE0) | 0x1F;
            packet[2] = 0xFF;
            return;
        }

        if Some(pid) == self.pcr_pid {
            if let Some(pcr) = decode_pcr(packet) {
                let now = Instant::now();
                if let (Some(prev), Some(prev_at)) = (self.last_pcr, self.last_pcr_at) {
                    let pcr_delta = pcr.wrapping_sub(prev) & PCR_BASE_MASK;
                    let wall_delta = now.duration_since(prev_at).as_micros() as u64;
                    // Prefer the PCR-derived delta; fall back to wall clock
                    // if the PCR counter wrapped or the sample was stale.
                    let delta_us = if pcr_delta > 0 && pcr_delta < PCR_BASE_MASK / 2 {
                        pcr_delta * 1_000_000 / 27_000_000
                    } else {
                        wall_delta
                    };
                    self.pcr_delta_us = delta_us.min(MAX_PCR_DELTA_US as u64) as u32;
                }
                self.last_pcr = Some(pcr);
                self.last_pcr_at = Some(now);
            }
        }
    }

    /// Total number of PIDs currently selected.
    pub fn used_count(&self) -> usize {
        self.entries.iter().filter(|e| e.used).count()
    }
}

/// Offset of a packet's payload, honoring the adaptation field when
/// present. `None` when the adaptation_field_control marks no payload.
fn payload_start(packet: &[u8]) -> Option<usize> {
    if packet.len() < 4 {
        return None;
    }
    match (packet[3] >> 4) & 0x3 {
        0b01 => Some(4),
        0b11 => {
            if packet.len() < 5 {
                return None;
            }
            Some(4 + 1 + packet[4] as usize)
        }
        _ => None,
    }
}

/// Offset of a PSI section's first byte (past the pointer field), for a
/// packet that starts a new section (`payload_unit_start_indicator` set).
fn psi_section_start(packet: &[u8]) -> Option<usize> {
    if packet.len() < 2 || packet[1] & 0x40 == 0 {
        return None;
    }
    let start = payload_start(packet)?;
    if start >= packet.len() {
        return None;
    }
    let pointer = packet[start] as usize;
    let section_start = start + 1 + pointer;
    if section_start >= packet.len() {
        return None;
    }
    Some(section_start)
}

/// Parses a PAT section and returns the PID of its first non-network
/// program (the PMT PID the gateway cares about), if any.
fn parse_pat_pmt_pid(packet: &[u8]) -> Option<u16> {
    let section_start = psi_section_start(packet)?;
    if packet.len() < section_start + 8 {
        return None;
    }
    if packet[section_start] != 0x00 {
        return None;
    }
    let section_length =
        (((packet[section_start + 1] as usize) & 0x0F) << 8) | packet[section_start + 2] as usize;
    let section_end = (section_start + 3 + section_length).min(packet.len());
    let loop_end = section_end.saturating_sub(4); // strip trailing CRC32
    let mut i = section_start + 8;
    while i + 4 <= loop_end {
        let program_number = ((packet[i] as u16) << 8) | packet[i + 1] as u16;
        let pid = (((packet[i + 2] as u16) & 0x1F) << 8) | packet[i + 3] as u16;
        if program_number != 0 {
            return Some(pid);
        }
        i += 4;
    }
    None
}

/// Parses a PMT section and returns its `PCR_PID` field, if any.
fn parse_pmt_pcr_pid(packet: &[u8]) -> Option<u16> {
    let section_start = psi_section_start(packet)?;
    if packet.len() < section_start + 10 {
        return None;
    }
    if packet[section_start] != 0x02 {
        return None;
    }
    let pid =
        (((packet[section_start + 8] as u16) & 0x1F) << 8) | packet[section_start + 9] as u16;
    Some(pid)
}

/// Decodes the 42-bit PCR (27MHz base*300+extension) from a TS packet's
/// adaptation field, if present.
fn decode_pcr(packet: &[u8]) -> Option<u64> {
    if packet.len() < 6 {
        return None;
    }
    let adaptation_field_control = (packet[3] >> 4) & 0x3;
    if adaptation_field_control != 0x2 && adaptation_field_control != 0x3 {
        return None;
    }
    let adaptation_field_length = packet[4] as usize;
    if adaptation_field_length < 1 || packet.len() < 6 + 4 {
        return None;
    }
    let flags = packet[5];
    if flags & 0x10 == 0 {
        return None;
    }

    let b = &packet[6..12];
    let base = ((b[0] as u64) << 25)
        | ((b[1] as u64) << 17)
        | ((b[2] as u64) << 9)
        | ((b[3] as u64) << 1)
        | ((b[4] as u64) >> 7);
    let ext = (((b[4] as u64) & 0x01) << 8) | (b[5] as u64);
    Some(base * 300 + ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet_with_pid(pid: u16, cc: u8) -> Vec<u8> {
        let mut p = vec![0xFFu8; 188];
        p[0] = 0x47;
        p[1] = ((pid >> 8) as u8) & 0x1F;
        p[2] = (pid & 0xFF) as u8;
        p[3] = 0x10 | (cc & 0x0F);
        p
    }

    /// A PAT section naming a single program, on PID 0, mapping
    /// `program_number` to `pmt_pid`.
    fn pat_packet(program_number: u16, pmt_pid: u16) -> Vec<u8> {
        let mut p = vec![0xFFu8; 188];
        p[0] = 0x47;
        p[1] = 0x40; // payload_unit_start_indicator, PID high bits 0
        p[2] = 0x00; // PID low bits 0 (PAT)
        p[3] = 0x10; // payload only, cc 0
        p[4] = 0x00; // pointer_field
        p[5] = 0x00; // table_id: PAT
        let section_length: u16 = 13; // transport_stream_id..last_section_number (5) + one program entry (4) + CRC (4)
        p[6] = 0xB0 | ((section_length >> 8) as u8 & 0x0F);
        p[7] = (section_length & 0xFF) as u8;
        p[8] = 0x00; // transport_stream_id hi
        p[9] = 0x01; // transport_stream_id lo
        p[10] = 0xC1; // reserved + version + current_next
        p[11] = 0x00; // section_number
        p[12] = 0x00; // last_section_number
        p[13] = (program_number >> 8) as u8;
        p[14] = (program_number & 0xFF) as u8;
        p[15] = 0xE0 | ((pmt_pid >> 8) as u8 & 0x1F);
        p[16] = (pmt_pid & 0xFF) as u8;
        p
    }

    /// A PMT section for `program_number` on `pid`, with no elementary
    /// streams, designating `pcr_pid`.
    fn pmt_packet(pid: u16, program_number: u16, pcr_pid: u16) -> Vec<u8> {
        let mut p = vec![0xFFu8; 188];
        p[0] = 0x47;
        p[1] = 0x40 | (((pid >> 8) as u8) & 0x1F);
        p[2] = (pid & 0xFF) as u8;
        p[3] = 0x10;
        p[4] = 0x00; // pointer_field
        p[5] = 0x02; // table_id: PMT
        let section_length: u16 = 13; // program_number..last_section_number (5) + PCR_PID (2) + program_info_length (2) + CRC (4)
        p[6] = 0xB0 | ((section_length >> 8) as u8 & 0x0F);
        p[7] = (section_length & 0xFF) as u8;
        p[8] = (program_number >> 8) as u8;
        p[9] = (program_number & 0xFF) as u8;
        p[10] = 0xC1;
        p[11] = 0x00;
        p[12] = 0x00;
        p[13] = 0xE0 | ((pcr_pid >> 8) as u8 & 0x1F);
        p[14] = (pcr_pid & 0xFF) as u8;
        p[15] = 0xF0; // reserved + program_info_length hi (0)
        p[16] = 0x00; // program_info_length lo
        p
    }

    #[test]
    fn update_pid_filters_is_idempotent() {
        let mut filters: FilterData<u32> = FilterData::new();
        filters.set_used(100, true);
        filters.set_used(200, true);

        let mut opened = Vec::new();
        filters.update_pid_filters(
            |pid| {
                opened.push(pid);
                Some(pid as u32)
            },
            |_, _| panic!("no closes expected"),
        );
        assert_eq!(opened, vec![100, 200]);

        opened.clear();
        filters.update_pid_filters(
            |pid| {
                opened.push(pid);
                Some(pid as u32)
            },
            |_, _| panic!("no closes expected"),
        );
        assert!(opened.is_empty(), "second call must not reopen existing filters");
    }

    #[test]
    fn unused_pid_gets_rewritten_to_null() {
        let filters: FilterData<u32> = FilterData::new();
        let mut packet = packet_with_pid(0x1ABC, 5);
        let original_cc = packet[3];
        let mut scratch = filters;
        scratch.add_data(&mut packet, true);
        let rewritten_pid = (((packet[1] & 0x1F) as u16) << 8) | packet[2] as u16;
        assert_eq!(rewritten_pid, NULL_PID);
        assert_eq!(packet[3], original_cc, "continuity counter must survive rewrite");
    }

    #[test]
    fn used_pid_passes_through_unchanged() {
        let mut filters: FilterData<u32> = FilterData::new();
        filters.set_used(0x100, true);
        let mut packet = packet_with_pid(0x100, 7);
        let before = packet.clone();
        filters.add_data(&mut packet, true);
        assert_eq!(packet, before);
    }

    #[test]
    fn closing_filters_does_not_touch_used_flags() {
        let mut filters: FilterData<u32> = FilterData::new();
        filters.set_used(10, true);
        filters.update_pid_filters(|pid| Some(pid as u32), |_, _| {});
        let mut closed = Vec::new();
        filters.close_active_pid_filters(|pid, token| closed.push((pid, token)));
        assert_eq!(closed, vec![(10, 10u32)]);
        assert!(filters.is_used(10), "close must not deselect the PID");
    }

    #[test]
    fn csv_parsing_selects_exact_set() {
        let mut filters: FilterData<u32> = FilterData::new();
        filters.set_pids_csv("100,256,257").unwrap();
        assert_eq!(filters.used_count(), 3);
        assert_eq!(filters.pids_csv(), "100,256,257");
        filters.set_pids_csv("1").unwrap();
        assert_eq!(filters.pids_csv(), "1");
    }

    #[test]
    fn packet_count_tracks_every_observed_pid_regardless_of_filter() {
        let mut filters: FilterData<u32> = FilterData::new();
        filters.set_used(0x100, true);

        filters.add_data(&mut packet_with_pid(0x100, 0), true);
        filters.add_data(&mut packet_with_pid(0x100, 1), true);
        filters.add_data(&mut packet_with_pid(0x200, 0), true);

        assert_eq!(filters.packet_count(0x100), 2);
        assert_eq!(filters.packet_count(0x200), 1, "filtered-out PIDs are still counted");
        assert_eq!(filters.total_packet_count(), 3);
    }

    #[test]
    fn pid_delta_closes_exactly_one_and_opens_exactly_one() {
        // S3: starting from {0, 17, 18, 100}, a delpids=100&addpids=200
        // request must close PID 100 once, open PID 200 once, and leave
        // the counters on 0/17/18 untouched.
        let mut filters: FilterData<u32> = FilterData::new();
        for pid in [0u16, 17, 18, 100] {
            filters.set_used(pid, true);
        }
        filters.update_pid_filters(|pid| Some(pid as u32), |_, _| {});
        filters.reset_changed();

        filters.add_data(&mut packet_with_pid(0, 0), false);
        filters.add_data(&mut packet_with_pid(17, 0), false);
        filters.add_data(&mut packet_with_pid(18, 0), false);
        filters.add_data(&mut packet_with_pid(100, 0), false);

        filters.set_used(100, false);
        filters.set_used(200, true);
        assert!(filters.has_changed());

        let mut opened = Vec::new();
        let mut closed = Vec::new();
        filters.update_pid_filters(
            |pid| {
                opened.push(pid);
                Some(pid as u32)
            },
            |pid, token| closed.push((pid, token)),
        );

        assert_eq!(opened, vec![200]);
        assert_eq!(closed, vec![(100, 100u32)]);
        assert_eq!(filters.packet_count(0), 1);
        assert_eq!(filters.packet_count(17), 1);
        assert_eq!(filters.packet_count(18), 1);
        assert_eq!(filters.packet_count(100), 1, "prior counter is preserved, not reset");
    }

    #[test]
    fn select_all_then_none_opens_and_closes_every_pid_exactly_once() {
        // S4: pids=all must reconcile to exactly PID_COUNT opens; the
        // following pids=none must reconcile to exactly PID_COUNT closes.
        let mut filters: FilterData<u32> = FilterData::new();
        filters.select_all();
        assert_eq!(filters.used_count(), PID_COUNT);

        let mut opened = Vec::new();
        filters.update_pid_filters(
            |pid| {
                opened.push(pid);
                Some(pid as u32)
            },
            |_, _| panic!("no closes expected on first reconciliation"),
        );
        assert_eq!(opened.len(), PID_COUNT);

        filters.select_none();
        assert_eq!(filters.used_count(), 0);

        let mut closed = Vec::new();
        filters.update_pid_filters(
            |_| panic!("no opens expected on second reconciliation"),
            |pid, token| closed.push((pid, token)),
        );
        assert_eq!(closed.len(), PID_COUNT);
    }

    #[test]
    fn pcr_sample_updates_delta() {
        let mut filters: FilterData<u32> = FilterData::new();
        filters.set_pcr_pid(Some(0x20));
        let mut p1 = packet_with_pid(0x20, 0);
        p1[3] = 0x30;
        p1[4] = 7;
        p1[5] = 0x10;
        let base1 = 1_000_000u64;
        p1[6] = (base1 >> 25) as u8;
        p1[7] = (base1 >> 17) as u8;
        p1[8] = (base1 >> 9) as u8;
        p1[9] = (base1 >> 1) as u8;
        p1[10] = ((base1 & 1) as u8) << 7;
        p1[11] = 0;
        filters.add_data(&mut p1, false);
        assert!(filters.last_pcr.is_some());

        let mut p2 = p1.clone();
        let base2 = base1 + 2_700_000; // 100ms at 27MHz
        p2[6] = (base2 >> 25) as u8;
        p2[7] = (base2 >> 17) as u8;
        p2[8] = (base2 >> 9) as u8;
        p2[9] = (base2 >> 1) as u8;
        p2[10] = ((base2 & 1) as u8) << 7;
        filters.add_data(&mut p2, false);
        assert!(filters.pcr_delta_us() > 0);
    }

    #[test]
    fn pcr_delta_is_clamped_to_the_sane_upper_bound() {
        let mut filters: FilterData<u32> = FilterData::new();
        filters.set_pcr_pid(Some(0x20));
        let mut p1 = packet_with_pid(0x20, 0);
        p1[3] = 0x30;
        p1[4] = 7;
        p1[5] = 0x10;
        let base1 = 0u64;
        p1[6] = (base1 >> 25) as u8;
        p1[7] = (base1 >> 17) as u8;
        p1[8] = (base1 >> 9) as u8;
        p1[9] = (base1 >> 1) as u8;
        p1[10] = ((base1 & 1) as u8) << 7;
        p1[11] = 0;
        filters.add_data(&mut p1, false);

        // A PCR jump of 2 full seconds (27MHz base), far beyond any real
        // broadcast cadence, must not turn into a multi-second sleep target.
        let mut p2 = p1.clone();
        let base2 = base1 + 2 * 27_000_000;
        p2[6] = (base2 >> 25) as u8;
        p2[7] = (base2 >> 17) as u8;
        p2[8] = (base2 >> 9) as u8;
        p2[9] = (base2 >> 1) as u8;
        p2[10] = ((base2 & 1) as u8) << 7;
        filters.add_data(&mut p2, false);
        assert_eq!(filters.pcr_delta_us(), MAX_PCR_DELTA_US);
    }

    #[test]
    fn pcr_pid_is_discovered_from_pat_and_pmt_without_an_explicit_call() {
        // Nothing ever calls `set_pcr_pid` here: PID 0x101 becomes the PCR
        // source purely from observing a PAT naming PMT PID 0x100, then a
        // PMT on 0x100 naming PCR_PID 0x101, the way a real multiplex
        // would arrive.
        let mut filters: FilterData<u32> = FilterData::new();
        assert_eq!(filters.pcr_pid(), None);

        filters.add_data(&mut pat_packet(1, 0x100), false);
        assert_eq!(filters.pmt_pid(), Some(0x100));
        assert!(filters.is_pmt(0x100));
        assert_eq!(filters.pcr_pid(), None, "PMT not yet seen");

        filters.add_data(&mut pmt_packet(0x100, 1, 0x101), false);
        assert_eq!(filters.pcr_pid(), Some(0x101));
        assert!(filters.is_pcr_source(0x101));

        let mut p1 = packet_with_pid(0x101, 0);
        p1[3] = 0x30;
        p1[4] = 7;
        p1[5] = 0x10;
        p1[6..11].copy_from_slice(&[0, 0, 0, 0, 0]);
        p1[11] = 0;
        filters.add_data(&mut p1, false);

        let mut p2 = p1.clone();
        let base2 = 2_700_000u64; // 100ms at 27MHz
        p2[6] = (base2 >> 25) as u8;
        p2[7] = (base2 >> 17) as u8;
        p2[8] = (base2 >> 9) as u8;
        p2[9] = (base2 >> 1) as u8;
        p2[10] = ((base2 & 1) as u8) << 7;
        filters.add_data(&mut p2, false);
        assert!(filters.pcr_delta_us() > 0, "pacing must derive from the discovered PCR PID");
    }

    #[test]
    fn pmt_moving_to_a_new_pid_clears_the_old_pmt_flag() {
        let mut filters: FilterData<u32> = FilterData::new();
        filters.add_data(&mut pat_packet(1, 0x100), false);
        assert!(filters.is_pmt(0x100));

        filters.add_data(&mut pat_packet(1, 0x200), false);
        assert!(!filters.is_pmt(0x100), "old PMT PID must lose the flag");
        assert!(filters.is_pmt(0x200));
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    /// Invariant: for any subset of PIDs selected, the sum of packets that
    /// pass through unchanged and packets rewritten to the null PID equals
    /// the total fed in, and a packet's continuity counter is conserved
    /// either way.
    #[quickcheck]
    fn null_rewrite_conserves_continuity_counter(pid_seed: u16, cc_seed: u8, selected_seed: u16) -> bool {
        let pid = pid_seed & 0x1FFF;
        let cc = cc_seed & 0x0F;
        let mut filters: FilterData<u32> = FilterData::new();
        if selected_seed % 2 == 0 {
            filters.set_used(pid, true);
        }

        let mut packet = vec![0xFFu8; 188];
        packet[0] = 0x47;
        packet[1] = ((pid >> 8) as u8) & 0x1F;
        packet[2] = (pid & 0xFF) as u8;
        packet[3] = 0x10 | cc;

        filters.add_data(&mut packet, true);
        packet[3] & 0x0F == cc
    }

    /// Invariant 7: for any sequence of packets fed through `add_data`, the
    /// sum of every per-PID counter equals the number of packets observed,
    /// regardless of how many distinct PIDs or filter states are involved.
    #[quickcheck]
    fn counter_conservation(pids: Vec<u16>, selected_seed: u16) -> bool {
        let mut filters: FilterData<u32> = FilterData::new();
        if selected_seed % 2 == 0 {
            filters.select_all();
        }
        let n = pids.len() as u64;
        for pid in pids {
            let pid = pid & 0x1FFF;
            let mut packet = vec![0xFFu8; 188];
            packet[0] = 0x47;
            packet[1] = ((pid >> 8) as u8) & 0x1F;
            packet[2] = (pid & 0xFF) as u8;
            packet[3] = 0x10;
            filters.add_data(&mut packet, true);
        }
        filters.total_packet_count() == n
    }
}
