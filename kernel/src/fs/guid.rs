//! Interface GUIDs.
//!
//! A VFS node exposes zero or more interfaces, each identified by a 128-bit
//! GUID rather than a fixed vtable slot, so a node can be queried for
//! exactly the capability a caller needs (`Identify`, `Stream`, `Folder`,
//! `Device`) without committing every node to every interface's method
//! set. Grounded on the teacher's `cap::token` packed-integer idiom for a
//! stable, comparable identity value; the GUID itself is a plain 128-bit
//! constant rather than a derived/packed field.

/// A 128-bit interface identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Guid(pub u128);

impl Guid {
    pub const fn new(value: u128) -> Self {
        Self(value)
    }

    /// Pack the standard 5-field GUID layout (32/16/16/16/48 bits) into a
    /// single `u128`, the same field split the original interface headers
    /// use for their `OS_DEFINE_GUID` constants.
    const fn from_fields(time_low: u32, time_mid: u16, time_hi_and_version: u16, clock_seq: u16, node: u64) -> Self {
        let hi = ((time_low as u128) << 32) | ((time_mid as u128) << 16) | (time_hi_and_version as u128);
        let lo = ((clock_seq as u128) << 48) | (node as u128 & 0xffff_ffff_ffff);
        Self((hi << 64) | lo)
    }
}

/// Every node supports `Identify`: ask what other interfaces it exposes.
pub const GUID_IDENTIFY: Guid = Guid(0x0001_0000_0000_0000_0000_0000_0000_0001);

/// A plain file node, as opposed to the `Stream` interface it exposes.
/// `kOsFileGuid` in `bezos/subsystem/fs.h`.
pub const GUID_FILE: Guid = Guid::from_fields(0x538202b8, 0xf97a, 0x11ef, 0x9446, 0x43376bcec51c);

/// Byte-stream read/write/seek, exposed by file-shaped nodes.
/// `kOsStreamGuid` in `bezos/subsystem/fs.h`.
pub const GUID_STREAM: Guid = Guid::from_fields(0xa2b6183e, 0xf9e2, 0x11ef, 0x9bf1, 0xdb0e14965a6f);

/// Directory enumeration and child lookup/create/unlink.
/// `kOsFolderGuid` in `bezos/subsystem/fs.h`.
pub const GUID_FOLDER: Guid = Guid::from_fields(0x5382039e, 0xf97a, 0x11ef, 0x9447, 0x73b093d39f67);

/// Device-specific control surface (stubbed; no concrete device driver is
/// part of this kernel's core scope).
pub const GUID_DEVICE: Guid = Guid(0x0001_0000_0000_0000_0000_0000_0000_0004);

/// Remaining well-known interface GUIDs named by spec §6 as needing to be
/// "preserved verbatim" for compatibility with existing subsystem headers.
/// None of these interfaces has a concrete driver in this kernel (sockets,
/// terminals, hardlinks/symlinks, HID, user, process-as-node, and display
/// are all external collaborators per spec §1); the constants exist so a
/// future driver can `impl VfsNode::supports` against the same identity the
/// rest of the system already expects.
pub const GUID_SOCKET: Guid = Guid::from_fields(0x7e74cd3a, 0xfd07, 0x11ef, 0x859a, 0x7faf25edb7ab);
pub const GUID_TERMINAL: Guid = Guid::from_fields(0x140706c7, 0xfe9a, 0x11ef, 0x8a0c, 0x17ca63280077);
pub const GUID_HARD_LINK: Guid = Guid::from_fields(0x14070816, 0xfe9a, 0x11ef, 0x8a0d, 0x432d3e3e7bb8);
pub const GUID_SYMBOLIC_LINK: Guid = Guid::from_fields(0x14070837, 0xfe9a, 0x11ef, 0x8a0e, 0x1387708268f2);
pub const GUID_PROCESS: Guid = Guid::from_fields(0xbef63de4, 0xf474, 0x11ef, 0x81ad, 0xd7f28f5e9282);
pub const GUID_USER: Guid = Guid::from_fields(0x516d10bc, 0xf475, 0x11ef, 0xa120, 0x4f23a297e81f);
pub const GUID_HID: Guid = Guid::from_fields(0xdd4ece3c, 0xec81, 0x11ef, 0x8b71, 0xc761047b867e);
pub const GUID_DISPLAY: Guid = Guid::from_fields(0x45a46f76, 0xed6a, 0x11ef, 0x8516, 0x33da61d08982);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_guids_are_distinct() {
        let all = [
            GUID_IDENTIFY,
            GUID_FILE,
            GUID_STREAM,
            GUID_FOLDER,
            GUID_DEVICE,
            GUID_SOCKET,
            GUID_TERMINAL,
            GUID_HARD_LINK,
            GUID_SYMBOLIC_LINK,
            GUID_PROCESS,
            GUID_USER,
            GUID_HID,
            GUID_DISPLAY,
        ];
        for (i, a) in all.iter().enumerate() {
            for (j, b) in all.iter().enumerate() {
                assert_eq!(i == j, a == b);
            }
        }
    }
}
