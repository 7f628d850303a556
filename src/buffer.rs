//! Bounded byte buffer holding whole 188-byte MPEG-TS packets (component C1).

/// Size of one MPEG-TS transport packet.
pub const TS_PACKET_LEN: usize = 188;

/// MPEG-TS sync byte, expected at the start of every transport packet.
pub const SYNC_BYTE: u8 = 0x47;

/// Number of packets a buffer normally holds; `7 * 188 = 1316` matches the
/// usual RTP payload size for MPEG-TS over UDP.
pub const DEFAULT_PACKET_COUNT: usize = 7;

/// A fixed-capacity region sized to `N * 188` bytes.
///
/// Bytes are appended via [`write_region`]/[`commit`], realigned with
/// [`try_sync`], and drained by the caller once [`full`] (or after a forced
/// [`mark_to_flush`]) before [`reset`] starts the next cycle.
#[derive(Debug)]
pub struct PacketBuffer {
    data: Vec<u8>,
    capacity: usize,
    written: usize,
    /// How many leading bytes of `data` have already been handed to
    /// [`new_packets_mut`]'s caller (`FilterData::add_data`) this cycle.
    /// Distinct from `written`: a fill cycle spans several
    /// `read_full_ts_packet` calls before the buffer is full or flushed,
    /// and each call must only feed the PID table the packets it has not
    /// seen yet.
    processed: usize,
    flushed: bool,
}

impl PacketBuffer {
    /// Builds a buffer sized to hold `packet_count` whole TS packets.
    pub fn new(packet_count: usize) -> Self {
        let capacity = packet_count * TS_PACKET_LEN;
        PacketBuffer {
            data: vec![0u8; capacity],
            capacity,
            written: 0,
            processed: 0,
            flushed: false,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn bytes_written(&self) -> usize {
        self.written
    }

    /// Number of whole packets currently held.
    #[inline]
    pub fn packet_count(&self) -> usize {
        self.written / TS_PACKET_LEN
    }

    /// Returns the next writable span and its length.
    pub fn write_region(&mut self) -> &mut [u8] {
        &mut self.data[self.written..self.capacity]
    }

    #[inline]
    pub fn bytes_to_write(&self) -> usize {
        self.capacity - self.written
    }

    /// Advances the write cursor after bytes have been copied into the span
    /// returned by [`write_region`].
    pub fn commit(&mut self, n_bytes: usize) {
        self.written = (self.written + n_bytes).min(self.capacity);
    }

    #[inline]
    pub fn full(&self) -> bool {
        self.written == self.capacity
    }

    /// True when every complete 188-byte chunk currently written starts with
    /// the sync byte.
    fn is_aligned(&self) -> bool {
        let mut i = 0;
        while i + TS_PACKET_LEN <= self.written {
            if self.data[i] != SYNC_BYTE {
                return false;
            }
            i += TS_PACKET_LEN;
        }
        true
    }

    /// Realigns the buffer on the MPEG-TS sync byte.
    ///
    /// If already aligned, this is a no-op and returns `true`. Otherwise it
    /// scans for an offset at which three consecutive 0x47 bytes land on
    /// 188-byte boundaries, discards everything before that offset, and
    /// returns `true`. If no such offset exists within the written region,
    /// it keeps only the trailing 187 bytes (so a sync byte straddling the
    /// next read can still be found) and returns `false`.
    pub fn try_sync(&mut self) -> bool {
        if self.is_aligned() {
            return true;
        }

        let len = self.written;
        for offset in 0..len {
            let p0 = offset;
            let p1 = offset + TS_PACKET_LEN;
            let p2 = offset + 2 * TS_PACKET_LEN;
            if p2 >= len {
                break;
            }
            if self.data[p0] == SYNC_BYTE && self.data[p1] == SYNC_BYTE && self.data[p2] == SYNC_BYTE {
                self.data.copy_within(offset..len, 0);
                self.written = len - offset;
                self.processed = self.processed.saturating_sub(offset);
                return true;
            }
        }

        let keep = len.min(TS_PACKET_LEN - 1);
        let start = len - keep;
        self.data.copy_within(start..len, 0);
        self.written = keep;
        self.processed = self.processed.saturating_sub(start);
        false
    }

    /// Forces whatever is currently buffered to be treated as ready for
    /// delivery, even though it is shorter than `capacity`. Always returns
    /// `true`; the next read cycle starts from an empty buffer.
    pub fn mark_to_flush(&mut self) -> bool {
        self.flushed = true;
        true
    }

    #[inline]
    pub fn was_flushed(&self) -> bool {
        self.flushed
    }

    /// Called by the consumer after draining the buffer.
    pub fn reset(&mut self) {
        self.written = 0;
        self.processed = 0;
        self.flushed = false;
    }

    /// Iterates over the complete 188-byte packets currently written.
    pub fn packets(&self) -> impl Iterator<Item = &[u8]> {
        self.data[..self.written].chunks_exact(TS_PACKET_LEN)
    }

    /// Mutable counterpart of [`packets`], used by filtering to rewrite PIDs
    /// in place.
    pub fn packets_mut(&mut self) -> impl Iterator<Item = &mut [u8]> {
        self.data[..self.written].chunks_exact_mut(TS_PACKET_LEN)
    }

    /// Iterates over the complete packets committed since the last call to
    /// this method (or since the buffer was last reset or resynced).
    /// `read_full_ts_packet` calls this once per read so a packet already
    /// fed to `FilterData::add_data` earlier in the same fill cycle is
    /// never counted twice.
    pub fn new_packets_mut(&mut self) -> impl Iterator<Item = &mut [u8]> {
        let ready_bytes = ((self.written - self.processed) / TS_PACKET_LEN) * TS_PACKET_LEN;
        let start = self.processed;
        let end = start + ready_bytes;
        self.processed = end;
        self.data[start..end].chunks_exact_mut(TS_PACKET_LEN)
    }

    /// The bytes currently written, for downstream hand-off (RTP layer, CA
    /// observer, …).
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.written]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn make_packet(pid: u16, cc: u8) -> [u8; TS_PACKET_LEN] {
        let mut p = [0xFFu8; TS_PACKET_LEN];
        p[0] = SYNC_BYTE;
        p[1] = ((pid >> 8) as u8) & 0x1F;
        p[2] = (pid & 0xFF) as u8;
        p[3] = 0x10 | (cc & 0x0F);
        p
    }

    fn fill(buf: &mut PacketBuffer, bytes: &[u8]) {
        let region = buf.write_region();
        region[..bytes.len()].copy_from_slice(bytes);
        buf.commit(bytes.len());
    }

    #[test]
    fn full_after_n_packets() {
        let mut buf = PacketBuffer::new(2);
        assert!(!buf.full());
        fill(&mut buf, &make_packet(0x100, 0));
        assert!(!buf.full());
        fill(&mut buf, &make_packet(0x100, 1));
        assert!(buf.full());
        assert_eq!(buf.packet_count(), 2);
    }

    #[test]
    fn sync_already_aligned_is_noop() {
        let mut buf = PacketBuffer::new(3);
        fill(&mut buf, &make_packet(1, 0));
        fill(&mut buf, &make_packet(2, 0));
        fill(&mut buf, &make_packet(3, 0));
        assert!(buf.try_sync());
        assert_eq!(buf.bytes_written(), 3 * TS_PACKET_LEN);
    }

    #[test]
    fn sync_recovers_from_junk_prefix() {
        let mut buf = PacketBuffer::new(7);
        let mut junk = vec![0xAAu8; 53];
        for p in [make_packet(10, 0), make_packet(11, 0), make_packet(12, 0)] {
            junk.extend_from_slice(&p);
        }
        fill(&mut buf, &junk);
        assert!(buf.try_sync());
        assert_eq!(buf.data[0], SYNC_BYTE);
        let first: Vec<&[u8]> = buf.packets().collect();
        assert_eq!(first[0][0], SYNC_BYTE);
    }

    #[test]
    fn sync_with_no_valid_run_keeps_tail_only() {
        let mut buf = PacketBuffer::new(2);
        fill(&mut buf, &[0xAAu8; 200]);
        assert!(!buf.try_sync());
        assert_eq!(buf.bytes_written(), TS_PACKET_LEN - 1);
    }

    #[test]
    fn new_packets_mut_does_not_repeat_across_calls() {
        let mut buf = PacketBuffer::new(7);
        fill(&mut buf, &make_packet(1, 0));
        assert_eq!(buf.new_packets_mut().count(), 1, "first call sees the one committed packet");
        assert_eq!(buf.new_packets_mut().count(), 0, "second call with no new bytes sees nothing");

        fill(&mut buf, &make_packet(2, 0));
        assert_eq!(buf.new_packets_mut().count(), 1, "only the newly committed packet is surfaced");
        assert_eq!(buf.packets().count(), 2, "packets() still sees the whole buffer");
    }

    #[test]
    fn new_packets_mut_cursor_does_not_underflow_on_forced_resync() {
        let mut buf = PacketBuffer::new(7);
        fill(&mut buf, &make_packet(1, 0));
        assert_eq!(buf.new_packets_mut().count(), 1, "pid 1 processed and counted once");

        // A long junk run with no embedded valid packet forces the
        // "keep only the trailing 187 bytes" fallback, which discards
        // everything already processed along with the junk.
        fill(&mut buf, &[0xAAu8; 250]);
        assert!(!buf.try_sync());
        assert_eq!(buf.new_packets_mut().count(), 0, "no complete packet survives the discard");
    }

    #[test]
    fn mark_to_flush_sets_sentinel() {
        let mut buf = PacketBuffer::new(7);
        fill(&mut buf, &make_packet(1, 0));
        assert!(!buf.full());
        assert!(buf.mark_to_flush());
        assert!(buf.was_flushed());
        buf.reset();
        assert!(!buf.was_flushed());
        assert_eq!(buf.bytes_written(), 0);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    /// Invariant 1: a random non-sync prefix (0..1000 bytes) followed by at
    /// least 3 well-formed TS packets always yields an aligned buffer.
    #[quickcheck]
    fn sync_robustness(prefix_len: usize, seed: u8) -> bool {
        let prefix_len = prefix_len % 1000;
        let mut buf = PacketBuffer::new(7);
        let mut bytes = Vec::new();
        for i in 0..prefix_len {
            let b = seed.wrapping_add(i as u8);
            // keep the prefix free of the sync byte so it is unambiguously junk
            bytes.push(if b == SYNC_BYTE { b.wrapping_add(1) } else { b });
        }
        for i in 0..3u16 {
            let mut p = [0u8; TS_PACKET_LEN];
            p[0] = SYNC_BYTE;
            p[1] = 0;
            p[2] = i as u8;
            p[3] = 0x10;
            bytes.extend_from_slice(&p);
        }
        if bytes.len() > buf.bytes_to_write() {
            bytes.truncate(buf.bytes_to_write());
        }
        let region = buf.write_region();
        region[..bytes.len()].copy_from_slice(&bytes);
        buf.commit(bytes.len());
        if !buf.try_sync() {
            return prefix_len + 3 * TS_PACKET_LEN > buf.capacity();
        }
        buf.packets().next().map(|p| p[0] == SYNC_BYTE).unwrap_or(false)
    }
}
