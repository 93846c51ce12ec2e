//! # Register Abstraction
//!
//! This module helps to describe small register files, such as the PCI Configuration Space and
//! its capabilities, with per-bit write semantics.

use crate::device::bus::Request;

/// A builder for [`RegisterSet`] objects.
///
/// With this struct the register file can be incrementally constructed
/// and finally converted into a matching `RegisterSet` struct, whose
/// layout is immutable.
///
/// # Examples
///
/// ```
/// use pcie_cosim::device::register_set::*;
///
/// let regs: RegisterSet::<8> = RegisterSetBuilder::<8>::new()
///     .u8_ro_at(0, 0xAB)        // A completely read-only byte register containing 0xAB at offset 0.
///     .u8_at(1, 0x10, 0x0F)     // A byte register with writable low nibble at offset 1.
///     .u16_le_rw_at(2, 0xCAFE)  // A little-endian fully writable 16-bit value.
///     .u16_le_w1c_at(4, 0x000F) // A 16-bit write-one-clear register, typically used for status bits.
///     .into();
/// ```
#[derive(Debug, Clone)]
pub struct RegisterSetBuilder<const SIZE: usize> {
    data: [u8; SIZE],
    rw_mask: [u8; SIZE],
    w1c_mask: [u8; SIZE],
}

impl<const SIZE: usize> Default for RegisterSetBuilder<SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const SIZE: usize> RegisterSetBuilder<SIZE> {
    /// Initialize a builder for a fully read-only register file where
    /// all bits are set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: [0xFF; SIZE],
            rw_mask: [0; SIZE],
            w1c_mask: [0; SIZE],
        }
    }

    /// Initialize a builder for a fully read-only register file where
    /// all bits are clear. Reserved fields of capabilities look like this.
    #[must_use]
    pub fn zeroed() -> Self {
        Self {
            data: [0; SIZE],
            ..Self::new()
        }
    }

    /// Place a little-endian field of `value.len()` bytes at `pos`.
    fn field(&mut self, pos: usize, value: &[u8], write_mask: &[u8], w1c_mask: &[u8]) -> &mut Self {
        assert!(pos + value.len() <= SIZE, "Register at {pos:#x} out of range");

        self.data[pos..pos + value.len()].copy_from_slice(value);
        self.rw_mask[pos..pos + value.len()].copy_from_slice(write_mask);
        self.w1c_mask[pos..pos + value.len()].copy_from_slice(w1c_mask);

        self
    }

    /// Place a byte at the specified address with a mask indicating
    /// which bits are writable.
    pub fn u8_at(&mut self, pos: usize, value: u8, write_mask: u8) -> &mut Self {
        self.field(pos, &[value], &[write_mask], &[0])
    }

    /// Place a read-only byte at the given position.
    pub fn u8_ro_at(&mut self, pos: usize, value: u8) -> &mut Self {
        self.u8_at(pos, value, 0)
    }

    /// Place a writable byte at the given position.
    pub fn u8_rw_at(&mut self, pos: usize, value: u8) -> &mut Self {
        self.u8_at(pos, value, 0xFF)
    }

    /// Place a 16-bit value at the specified address in little-endian
    /// order with a mask indicating which bits are writable.
    pub fn u16_le_at(&mut self, pos: usize, value: u16, write_mask: u16) -> &mut Self {
        self.field(
            pos,
            &value.to_le_bytes(),
            &write_mask.to_le_bytes(),
            &[0; 2],
        )
    }

    /// Place a read-only 16-bit value at the given position in
    /// little-endian order.
    pub fn u16_le_ro_at(&mut self, pos: usize, value: u16) -> &mut Self {
        self.u16_le_at(pos, value, 0)
    }

    /// Place a writable 16-bit value at the given position in
    /// little-endian order.
    pub fn u16_le_rw_at(&mut self, pos: usize, value: u16) -> &mut Self {
        self.u16_le_at(pos, value, 0xFFFF)
    }

    /// Place a little-endian 16-bit write-one-clear (W1C) value at the given position. Bits flip
    /// to zero when they are written with a 1.
    pub fn u16_le_w1c_at(&mut self, pos: usize, value: u16) -> &mut Self {
        self.u16_le_mixed_at(pos, value, 0, 0xFFFF)
    }

    /// Place a little-endian 16-bit value with writable bits in `write_mask` and write-one-clear
    /// bits in `w1c_mask`.
    pub fn u16_le_mixed_at(
        &mut self,
        pos: usize,
        value: u16,
        write_mask: u16,
        w1c_mask: u16,
    ) -> &mut Self {
        self.field(
            pos,
            &value.to_le_bytes(),
            &write_mask.to_le_bytes(),
            &w1c_mask.to_le_bytes(),
        )
    }

    /// Place a 32-bit value at the specified address in little-endian
    /// order with a mask indicating which bits are writable.
    pub fn u32_le_at(&mut self, pos: usize, value: u32, write_mask: u32) -> &mut Self {
        self.field(
            pos,
            &value.to_le_bytes(),
            &write_mask.to_le_bytes(),
            &[0; 4],
        )
    }

    /// Place a read-only 32-bit value at the given position in
    /// little-endian order.
    pub fn u32_le_ro_at(&mut self, pos: usize, value: u32) -> &mut Self {
        self.u32_le_at(pos, value, 0)
    }

    /// Place an already existing register set at the given position.
    ///
    /// The copy inherits the current value and write attributes of `regs`, but is otherwise
    /// independent of it.
    pub fn register_set_at<const PART_SIZE: usize>(
        &mut self,
        pos: usize,
        regs: &RegisterSet<PART_SIZE>,
    ) -> &mut Self {
        self.field(pos, &regs.data, &regs.rw_mask, &regs.w1c_mask)
    }

    /// Construct the final register set from the build instructions.
    #[must_use]
    pub fn build(&self) -> RegisterSet<SIZE> {
        for (offset, (rw_mask, w1c_mask)) in self.rw_mask.iter().zip(&self.w1c_mask).enumerate() {
            let overlap = rw_mask & w1c_mask;
            assert_eq!(
                overlap, 0,
                "Writable and W1C bits overlap in register set at offset {offset:#x}: {overlap:#x}"
            );
        }

        RegisterSet {
            data: self.data,
            rw_mask: self.rw_mask,
            w1c_mask: self.w1c_mask,
        }
    }
}

/// A fixed-size register file with configurable writability.
///
/// `RegisterSets` are constructed using [`RegisterSetBuilder`].
#[derive(Debug, Clone)]
pub struct RegisterSet<const SIZE: usize> {
    data: [u8; SIZE],
    rw_mask: [u8; SIZE],
    w1c_mask: [u8; SIZE],
}

impl<const SIZE: usize> From<&mut RegisterSetBuilder<SIZE>> for RegisterSet<SIZE> {
    fn from(builder: &mut RegisterSetBuilder<SIZE>) -> Self {
        builder.build()
    }
}

impl<const SIZE: usize> From<RegisterSetBuilder<SIZE>> for RegisterSet<SIZE> {
    fn from(builder: RegisterSetBuilder<SIZE>) -> Self {
        builder.build()
    }
}

impl<const SIZE: usize> RegisterSet<SIZE> {
    /// The size of the register file in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        SIZE
    }

    /// Read a little-endian value.
    #[must_use]
    pub fn read(&self, req: Request) -> u64 {
        req.iter_bytes().enumerate().fold(0, |acc, (pos, r)| {
            acc | u64::from(self.data[r.addr as usize]) << (pos * 8)
        })
    }

    /// Write a little-endian value observing the write masks.
    pub fn write(&mut self, req: Request, val: u64) {
        for (r, byte) in req.iter_bytes().zip(val.to_le_bytes()) {
            let off = r.addr as usize;

            // Replace writable bits and clear all W1C bits that were written with 1.
            self.data[off] = (self.data[off] & !self.rw_mask[off]) | (byte & self.rw_mask[off]);
            self.data[off] &= !(byte & self.w1c_mask[off]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::device::bus::RequestSize;

    #[test]
    fn unspecified_registers_are_ro_and_have_all_bits_set() {
        let mut regs: RegisterSet<8> = RegisterSetBuilder::<8>::new().into();

        assert_eq!(regs.read(Request::new(1, RequestSize::Size1)), 0xFF);
        assert_eq!(
            regs.read(Request::new(0, RequestSize::Size8)),
            0xFFFF_FFFF_FFFF_FFFF
        );

        regs.write(Request::new(0, RequestSize::Size2), 0);
        assert_eq!(regs.read(Request::new(0, RequestSize::Size2)), 0xFFFF);
    }

    #[test]
    fn byte_order_is_observed() {
        let regs: RegisterSet<4> = RegisterSetBuilder::<4>::new()
            .u16_le_ro_at(0, 0xCAFE)
            .u16_le_ro_at(2, 0xD00D)
            .into();

        assert_eq!(regs.read(Request::new(0, RequestSize::Size1)), 0xFE);
        assert_eq!(regs.read(Request::new(1, RequestSize::Size1)), 0xCA);
        assert_eq!(regs.read(Request::new(0, RequestSize::Size4)), 0xD00D_CAFE);
    }

    #[test]
    fn partially_writable_registers_observe_write_mask() {
        let mut regs: RegisterSet<2> = RegisterSetBuilder::<2>::new()
            .u16_le_at(0, 0xCAFE, 0x0F0F)
            .into();

        regs.write(Request::new(0, RequestSize::Size2), 0x4433);
        assert_eq!(regs.read(Request::new(0, RequestSize::Size2)), 0xC4F3);
    }

    #[test]
    fn write_clear_bits_are_cleared() {
        let mut regs: RegisterSet<4> = RegisterSetBuilder::<4>::new()
            .u16_le_w1c_at(0, 0x00FF)
            .u16_le_mixed_at(2, 0x8003, 0x0003, 0x8000)
            .into();

        regs.write(Request::new(0, RequestSize::Size2), 0x0011);
        assert_eq!(regs.read(Request::new(0, RequestSize::Size2)), 0x00EE);

        // Writing zero to a W1C bit keeps it, writable bits take the new value.
        regs.write(Request::new(2, RequestSize::Size2), 0x0001);
        assert_eq!(regs.read(Request::new(2, RequestSize::Size2)), 0x8001);

        regs.write(Request::new(2, RequestSize::Size2), 0x8000);
        assert_eq!(regs.read(Request::new(2, RequestSize::Size2)), 0x0000);
    }

    #[test]
    fn can_place_register_set() {
        let part: RegisterSet<4> = RegisterSetBuilder::<4>::new()
            .u32_le_at(0, 0x12345678, 0xFFFF0000)
            .into();
        let mut whole: RegisterSet<16> = RegisterSetBuilder::<16>::new()
            .register_set_at(4, &part)
            .into();

        assert_eq!(whole.read(Request::new(4, RequestSize::Size4)), 0x12345678);

        whole.write(Request::new(4, RequestSize::Size4), 0xABCDEF12);
        assert_eq!(whole.read(Request::new(4, RequestSize::Size4)), 0xABCD5678);
    }

    #[test]
    #[should_panic]
    fn overlapping_write_and_w1c_bits_are_rejected() {
        let _: RegisterSet<2> = RegisterSetBuilder::<2>::new()
            .u16_le_mixed_at(0, 0, 0x0001, 0x0001)
            .into();
    }
}
