//! The `Handle` type: an opaque `{type:8, id:56}` token.
//!
//! Grounded on the teacher's `cap::token::CapabilityToken`, which packs
//! `id:48 | generation:8 | type:8 | flags:4 | pad:4` into a `u64`. That
//! layout is not reused verbatim: a `Handle` here carries no generation or
//! flags bits of its own (rights live in `HandleTable`'s `AccessMask`
//! instead, and reuse-after-free is prevented by the registry never
//! reassigning an id rather than by a generation counter), so only the
//! `{type, id}` packing idiom survives the transformation.

use core::fmt;

/// Reserved handle value meaning "no handle" / the null handle.
pub const OS_HANDLE_INVALID: Handle = Handle(0);

/// Discriminates what kind of kernel object a [`Handle`] refers to.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ObjectType {
    Process = 1,
    Thread = 2,
    Mutex = 3,
    Event = 4,
    VfsNode = 5,
    VfsNodeHandle = 6,
    Device = 7,
    AddressSpace = 8,
    Transaction = 9,
}

impl ObjectType {
    pub const fn from_u8(raw: u8) -> Option<Self> {
        Some(match raw {
            1 => Self::Process,
            2 => Self::Thread,
            3 => Self::Mutex,
            4 => Self::Event,
            5 => Self::VfsNode,
            6 => Self::VfsNodeHandle,
            7 => Self::Device,
            8 => Self::AddressSpace,
            9 => Self::Transaction,
            _ => return None,
        })
    }
}

/// Opaque handle: the high byte is the object type, the low 56 bits are a
/// registry-assigned id. A handle is meaningless outside the table (or the
/// global registry) that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(u64);

const ID_BITS: u32 = 56;
const ID_MASK: u64 = (1 << ID_BITS) - 1;

impl Handle {
    pub const fn new(object_type: ObjectType, id: u64) -> Self {
        Self(((object_type as u64) << ID_BITS) | (id & ID_MASK))
    }

    pub const fn object_type(self) -> Option<ObjectType> {
        ObjectType::from_u8((self.0 >> ID_BITS) as u8)
    }

    pub const fn id(self) -> u64 {
        self.0 & ID_MASK
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub const fn from_u64(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl Default for Handle {
    fn default() -> Self {
        OS_HANDLE_INVALID
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:#018x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_and_unpack_roundtrip() {
        let h = Handle::new(ObjectType::VfsNode, 0x1234);
        assert_eq!(h.object_type(), Some(ObjectType::VfsNode));
        assert_eq!(h.id(), 0x1234);
    }

    #[test]
    fn invalid_handle_is_zero() {
        assert_eq!(OS_HANDLE_INVALID.as_u64(), 0);
        assert!(!OS_HANDLE_INVALID.is_valid());
    }

    #[test]
    fn id_does_not_bleed_into_type_byte() {
        let h = Handle::new(ObjectType::Thread, ID_MASK);
        assert_eq!(h.object_type(), Some(ObjectType::Thread));
        assert_eq!(h.id(), ID_MASK);
    }

    #[test]
    fn unknown_type_byte_is_none() {
        let raw = Handle::from_u64(0xff << 56);
        assert_eq!(raw.object_type(), None);
    }
}
