//! Native-call trace formatting
//!
//! Turns a function name, a type-tag string (one character per parameter)
//! and the raw parameter cells of a script VM call into
//! `name(arg0, arg1, ...)`.
//!
//! | tag       | rendering                                  |
//! |-----------|--------------------------------------------|
//! | `d` `i`   | signed integer                             |
//! | `f`       | float decoded from the cell bits           |
//! | `h` `x`   | lowercase hex                              |
//! | `b`       | binary                                     |
//! | `s`       | dereferenced string, quoted                |
//! | `*`       | `"*****"` whatever the value               |
//! | `r`       | address of the referenced cell, `0x%08X`   |
//! | `p`       | raw cell as pointer, `0x%08X`              |

use std::fmt::Write;

use crate::constants::CENSORED_PLACEHOLDER;
use crate::error::{LogError, Result};

// =============================================================================
// Parameter cells
// =============================================================================

/// One raw 32-bit VM parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct ParamCell(pub i32);

impl ParamCell {
    #[inline]
    pub fn from_int(value: i32) -> Self {
        Self(value)
    }

    /// Store a float the way the VM does (bit pattern in the cell)
    #[inline]
    pub fn from_float(value: f32) -> Self {
        Self(value.to_bits() as i32)
    }

    #[inline]
    pub fn as_int(self) -> i32 {
        self.0
    }

    #[inline]
    pub fn as_bits(self) -> u32 {
        self.0 as u32
    }

    #[inline]
    pub fn as_float(self) -> f32 {
        f32::from_bits(self.as_bits())
    }
}

/// Access to the VM memory that string and reference cells point into
pub trait CellMemory {
    /// String stored at the VM address held by `cell`
    fn read_string(&self, cell: ParamCell) -> Option<String>;

    /// Host address of the VM cell addressed by `cell`
    fn address_of(&self, cell: ParamCell) -> Option<u64>;
}

/// Memory for calls without string or reference parameters
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMemory;

impl CellMemory for NoMemory {
    fn read_string(&self, _cell: ParamCell) -> Option<String> {
        None
    }

    fn address_of(&self, _cell: ParamCell) -> Option<u64> {
        None
    }
}

/// Flat VM data segment: cells addressed by byte offset, strings stored one
/// character per cell and zero-terminated
#[derive(Debug, Clone, Default)]
pub struct VmMemory {
    base: u64,
    cells: Vec<i32>,
}

const CELL_SIZE: usize = std::mem::size_of::<i32>();

impl VmMemory {
    /// `base` is the host address of the first cell
    pub fn new(base: u64) -> Self {
        Self {
            base,
            cells: Vec::new(),
        }
    }

    /// Append a value, returning its VM address
    pub fn push_cell(&mut self, value: i32) -> ParamCell {
        let addr = self.cells.len() * CELL_SIZE;
        self.cells.push(value);
        ParamCell(addr as i32)
    }

    /// Append a zero-terminated string, returning its VM address
    pub fn push_str(&mut self, value: &str) -> ParamCell {
        let addr = self.cells.len() * CELL_SIZE;
        self.cells.extend(value.chars().map(|c| c as i32));
        self.cells.push(0);
        ParamCell(addr as i32)
    }

    fn index(&self, cell: ParamCell) -> Option<usize> {
        let offset = usize::try_from(cell.as_int()).ok()?;
        if offset % CELL_SIZE != 0 {
            return None;
        }
        let index = offset / CELL_SIZE;
        (index < self.cells.len()).then_some(index)
    }
}

impl CellMemory for VmMemory {
    fn read_string(&self, cell: ParamCell) -> Option<String> {
        let start = self.index(cell)?;
        self.cells[start..]
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| char::from_u32(c as u32))
            .collect()
    }

    fn address_of(&self, cell: ParamCell) -> Option<u64> {
        let index = self.index(cell)?;
        Some(self.base + (index * CELL_SIZE) as u64)
    }
}

// =============================================================================
// Formatting
// =============================================================================

/// Render `name(arg, ...)`.
///
/// Fails without producing output on an empty name, an unknown tag, a tag
/// with no matching parameter, or a string/reference that does not resolve.
/// An empty tag string is valid and renders `name()`.
pub fn format_native_call(
    name: &str,
    tags: &str,
    params: &[ParamCell],
    memory: &dyn CellMemory,
) -> Result<String> {
    if name.is_empty() {
        return Err(LogError::EmptyFunctionName);
    }

    let mut out = String::with_capacity(name.len() + 2 + tags.len() * 8);
    out.push_str(name);
    out.push('(');

    for (position, tag) in tags.chars().enumerate() {
        if position != 0 {
            out.push_str(", ");
        }
        let cell = *params
            .get(position)
            .ok_or(LogError::MissingParameter { position })?;
        let unresolved = LogError::UnresolvedCell { tag, position };

        // Writing into a String cannot fail
        let _ = match tag {
            'd' | 'i' => write!(out, "{}", cell.as_int()),
            'f' => write!(out, "{}", cell.as_float()),
            'h' | 'x' => write!(out, "{:x}", cell.as_bits()),
            'b' => write!(out, "{:b}", cell.as_bits()),
            's' => {
                let value = memory.read_string(cell).ok_or(unresolved)?;
                write!(out, "\"{}\"", value)
            }
            '*' => write!(out, "{}", CENSORED_PLACEHOLDER),
            'r' => {
                let addr = memory.address_of(cell).ok_or(unresolved)?;
                write!(out, "0x{:08X}", addr)
            }
            'p' => write!(out, "0x{:08X}", cell.as_bits()),
            _ => return Err(LogError::UnrecognizedTag { tag, position }),
        };
    }

    out.push(')');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_float_string() {
        let mut mem = VmMemory::new(0x1000);
        let hi = mem.push_str("hi");
        let params = [ParamCell::from_int(5), ParamCell::from_float(2.5), hi];

        let out = format_native_call("funcname", "dfs", &params, &mem).unwrap();
        assert_eq!(out, "funcname(5, 2.5, \"hi\")");
    }

    #[test]
    fn test_no_parameters() {
        assert_eq!(
            format_native_call("GetTickCount", "", &[], &NoMemory).unwrap(),
            "GetTickCount()"
        );
    }

    #[test]
    fn test_negative_integer() {
        let out = format_native_call("f", "i", &[ParamCell(-42)], &NoMemory).unwrap();
        assert_eq!(out, "f(-42)");
    }

    #[test]
    fn test_hex_and_binary() {
        let params = [ParamCell(255), ParamCell(255), ParamCell(5)];
        let out = format_native_call("f", "hxb", &params, &NoMemory).unwrap();
        assert_eq!(out, "f(ff, ff, 101)");

        let out = format_native_call("f", "x", &[ParamCell(-1)], &NoMemory).unwrap();
        assert_eq!(out, "f(ffffffff)");
    }

    #[test]
    fn test_censored_ignores_value() {
        for raw in [0, 1, -1, i32::MAX, 0x1234] {
            let out = format_native_call("login", "*", &[ParamCell(raw)], &NoMemory).unwrap();
            assert_eq!(out, "login(\"*****\")");
        }
    }

    #[test]
    fn test_pointer_padding() {
        let out = format_native_call("f", "p", &[ParamCell(0xAB)], &NoMemory).unwrap();
        assert_eq!(out, "f(0x000000AB)");
    }

    #[test]
    fn test_reference_resolves_address() {
        let mut mem = VmMemory::new(0x2000);
        mem.push_cell(7);
        let second = mem.push_cell(9);
        let out = format_native_call("f", "r", &[second], &mem).unwrap();
        assert_eq!(out, "f(0x00002004)");
    }

    #[test]
    fn test_unrecognized_tag_fails() {
        let err = format_native_call("f", "dz", &[ParamCell(1), ParamCell(2)], &NoMemory)
            .unwrap_err();
        assert!(matches!(
            err,
            LogError::UnrecognizedTag {
                tag: 'z',
                position: 1
            }
        ));
    }

    #[test]
    fn test_missing_parameter_fails() {
        let err = format_native_call("f", "dd", &[ParamCell(1)], &NoMemory).unwrap_err();
        assert!(matches!(err, LogError::MissingParameter { position: 1 }));
    }

    #[test]
    fn test_unresolved_string_fails() {
        let err = format_native_call("f", "s", &[ParamCell(64)], &NoMemory).unwrap_err();
        assert!(matches!(err, LogError::UnresolvedCell { tag: 's', .. }));
    }

    #[test]
    fn test_empty_name_fails() {
        assert!(matches!(
            format_native_call("", "", &[], &NoMemory),
            Err(LogError::EmptyFunctionName)
        ));
    }

    #[test]
    fn test_vm_memory_rejects_misaligned_offsets() {
        let mut mem = VmMemory::new(0);
        mem.push_str("abc");
        assert_eq!(mem.read_string(ParamCell(0)).as_deref(), Some("abc"));
        assert_eq!(mem.read_string(ParamCell(4)).as_deref(), Some("bc"));
        assert!(mem.read_string(ParamCell(2)).is_none());
        assert!(mem.read_string(ParamCell(-4)).is_none());
    }
}
