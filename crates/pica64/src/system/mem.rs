//! RDRAM and the segment table.

use zerocopy::{FromBytes, Immutable, KnownLayout, Unaligned};

use crate::system::gbi::{Command, RawCommand};

/// Mask of physical addresses.
pub const PHYSICAL_MASK: u32 = 0x1FFF_FFFF;
/// Number of segment table entries.
pub const SEGMENTS: usize = 16;

/// RDRAM as seen by the RSP.
pub struct Memory {
    ram: Box<[u8]>,
    segments: [u32; SEGMENTS],
}

impl Memory {
    pub fn new(ram: Vec<u8>) -> Self {
        Self {
            ram: ram.into_boxed_slice(),
            segments: [0; SEGMENTS],
        }
    }

    #[inline(always)]
    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    #[inline(always)]
    pub fn ram_mut(&mut self) -> &mut [u8] {
        &mut self.ram
    }

    pub fn segments(&self) -> &[u32; SEGMENTS] {
        &self.segments
    }

    pub fn set_segment(&mut self, index: usize, base: u32) {
        self.segments[index % SEGMENTS] = base & PHYSICAL_MASK;
    }

    /// Translates a segmented address into a physical one.
    #[inline(always)]
    pub fn resolve(&self, addr: u32) -> u32 {
        let segment = self.segments[((addr >> 24) & 0xF) as usize];
        segment.wrapping_add(addr & 0x00FF_FFFF) & PHYSICAL_MASK
    }

    /// `len` bytes at physical address `addr`, if they are all in range.
    #[inline(always)]
    pub fn slice(&self, addr: u32, len: usize) -> Option<&[u8]> {
        let start = addr as usize;
        self.ram.get(start..start.checked_add(len)?)
    }

    /// Bytes from physical address `addr` up to the end of RAM.
    pub fn tail(&self, addr: u32) -> Option<&[u8]> {
        self.ram.get(addr as usize..)
    }

    pub fn read<T>(&self, addr: u32) -> Option<&T>
    where
        T: FromBytes + KnownLayout + Immutable + Unaligned,
    {
        let bytes = self.slice(addr, size_of::<T>())?;
        T::ref_from_bytes(bytes).ok()
    }

    pub fn read_slice<T>(&self, addr: u32, count: usize) -> Option<&[T]>
    where
        T: FromBytes + Immutable + Unaligned,
    {
        let bytes = self.slice(addr, count.checked_mul(size_of::<T>())?)?;
        <[T]>::ref_from_bytes_with_elems(bytes, count).ok()
    }

    pub fn command(&self, addr: u32) -> Option<Command> {
        self.read::<RawCommand>(addr).copied().map(Command::from)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::system::gbi::Vtx;

    #[test]
    fn segmented_addresses() {
        let mut mem = Memory::new(vec![0; 0x1000]);
        assert_eq!(mem.resolve(0x8000_0400), 0x400);
        assert_eq!(mem.resolve(0x0000_0400), 0x400);

        mem.set_segment(2, 0x8000_0800);
        assert_eq!(mem.segments()[2], 0x800);
        assert_eq!(mem.resolve(0x0200_0010), 0x810);
        assert_eq!(mem.resolve(0x0100_0010), 0x10);
    }

    #[test]
    fn reads_are_bounded() {
        let mut ram = vec![0; 64];
        ram[16..24].copy_from_slice(&[0xB8, 0, 0, 0, 0x12, 0x34, 0x56, 0x78]);
        let mem = Memory::new(ram);

        let cmd = mem.command(16).unwrap();
        assert_eq!(cmd.opcode(), 0xB8);
        assert_eq!(cmd.w1, 0x1234_5678);

        assert!(mem.command(60).is_none());
        assert!(mem.read::<Vtx>(48).is_some());
        assert!(mem.read::<Vtx>(49).is_none());
        assert!(mem.read_slice::<Vtx>(0, 4).is_some());
        assert!(mem.read_slice::<Vtx>(0, 5).is_none());
        assert!(mem.slice(u32::MAX, 2).is_none());
    }
}
