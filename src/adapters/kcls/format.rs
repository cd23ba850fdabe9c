//! KCLS class image constants. All multi-byte values are big-endian.

/// "KCLS"
pub const MAGIC: u32 = 0x4B43_4C53;

pub mod op {
    pub const NOP: u8 = 0x00;
    pub const ACONST_NULL: u8 = 0x01;
    pub const ICONST: u8 = 0x02;
    pub const LDC: u8 = 0x03;
    pub const ILOAD: u8 = 0x04;
    pub const ISTORE: u8 = 0x05;
    pub const ALOAD: u8 = 0x06;
    pub const ASTORE: u8 = 0x07;
    pub const POP: u8 = 0x08;
    pub const DUP: u8 = 0x09;
    pub const SWAP: u8 = 0x0A;
    pub const NEW: u8 = 0x0B;
    pub const CHECKCAST: u8 = 0x0C;
    pub const GETFIELD: u8 = 0x0D;
    pub const PUTFIELD: u8 = 0x0E;
    pub const GETSTATIC: u8 = 0x0F;
    pub const PUTSTATIC: u8 = 0x10;
    pub const INVOKEVIRTUAL: u8 = 0x11;
    pub const INVOKESPECIAL: u8 = 0x12;
    pub const INVOKESTATIC: u8 = 0x13;
    pub const INVOKEINTERFACE: u8 = 0x14;
    pub const IFNULL: u8 = 0x15;
    pub const IFNONNULL: u8 = 0x16;
    pub const IFEQ: u8 = 0x17;
    pub const IFNE: u8 = 0x18;
    pub const GOTO: u8 = 0x19;
    pub const LABEL: u8 = 0x1A;
    pub const RETURN: u8 = 0x1B;
    pub const IRETURN: u8 = 0x1C;
    pub const ARETURN: u8 = 0x1D;
    pub const ATHROW: u8 = 0x1E;
}

/// Annotation element value tags
pub mod tag {
    pub const STRING: u8 = b's';
    pub const CLASS: u8 = b'c';
    pub const INT: u8 = b'i';
    /// followed by the JVM element tag and a u64 of raw bits
    pub const PRIMITIVE: u8 = b'p';
    pub const ENUM: u8 = b'e';
    pub const NESTED: u8 = b'@';
    pub const ARRAY: u8 = b'[';
}

/// Verification type tags of a frame entry
pub mod vt {
    pub const TOP: u8 = 0;
    pub const INTEGER: u8 = 1;
    pub const FLOAT: u8 = 2;
    pub const LONG: u8 = 3;
    pub const DOUBLE: u8 = 4;
    pub const NULL: u8 = 5;
    pub const UNINITIALIZED_THIS: u8 = 6;
    /// followed by a u16 pool index
    pub const OBJECT: u8 = 7;
    /// followed by the u32 index of the `New` instruction
    pub const UNINITIALIZED: u8 = 8;
}
