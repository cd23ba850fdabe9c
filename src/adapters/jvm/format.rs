//! JVM class file constants. All multi-byte values are big-endian.

pub const MAGIC: u32 = 0xCAFE_BABE;

/// Oldest major version a JVM loads.
pub const MIN_MAJOR: u16 = 45;
/// Major version written for models whose version no JVM would load.
pub const DEFAULT_MAJOR: u16 = 52;

/// Largest `code_length` a method body may have.
pub const MAX_CODE_LENGTH: usize = 65_535;

/// Constant pool tags
pub mod tag {
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELDREF: u8 = 9;
    pub const METHODREF: u8 = 10;
    pub const INTERFACE_METHODREF: u8 = 11;
    pub const NAME_AND_TYPE: u8 = 12;
    pub const METHOD_HANDLE: u8 = 15;
    pub const METHOD_TYPE: u8 = 16;
    pub const DYNAMIC: u8 = 17;
    pub const INVOKE_DYNAMIC: u8 = 18;
    pub const MODULE: u8 = 19;
    pub const PACKAGE: u8 = 20;
}

pub mod attr {
    pub const CODE: &str = "Code";
    pub const STACK_MAP_TABLE: &str = "StackMapTable";
    pub const VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
    pub const INVISIBLE_ANNOTATIONS: &str = "RuntimeInvisibleAnnotations";
}

/// Opcodes of the modeled instruction subset, plus the few the scanner must know.
pub mod op {
    pub const NOP: u8 = 0x00;
    pub const ACONST_NULL: u8 = 0x01;
    pub const ICONST_M1: u8 = 0x02;
    pub const ICONST_0: u8 = 0x03;
    pub const ICONST_5: u8 = 0x08;
    pub const BIPUSH: u8 = 0x10;
    pub const SIPUSH: u8 = 0x11;
    pub const LDC: u8 = 0x12;
    pub const LDC_W: u8 = 0x13;
    pub const ILOAD: u8 = 0x15;
    pub const ALOAD: u8 = 0x19;
    pub const ILOAD_0: u8 = 0x1a;
    pub const ALOAD_0: u8 = 0x2a;
    pub const ISTORE: u8 = 0x36;
    pub const ASTORE: u8 = 0x3a;
    pub const ISTORE_0: u8 = 0x3b;
    pub const ASTORE_0: u8 = 0x4b;
    pub const POP: u8 = 0x57;
    pub const DUP: u8 = 0x59;
    pub const SWAP: u8 = 0x5f;
    pub const IINC: u8 = 0x84;
    pub const IFEQ: u8 = 0x99;
    pub const IFNE: u8 = 0x9a;
    pub const GOTO: u8 = 0xa7;
    pub const TABLESWITCH: u8 = 0xaa;
    pub const LOOKUPSWITCH: u8 = 0xab;
    pub const IRETURN: u8 = 0xac;
    pub const ARETURN: u8 = 0xb0;
    pub const RETURN: u8 = 0xb1;
    pub const GETSTATIC: u8 = 0xb2;
    pub const PUTSTATIC: u8 = 0xb3;
    pub const GETFIELD: u8 = 0xb4;
    pub const PUTFIELD: u8 = 0xb5;
    pub const INVOKEVIRTUAL: u8 = 0xb6;
    pub const INVOKESPECIAL: u8 = 0xb7;
    pub const INVOKESTATIC: u8 = 0xb8;
    pub const INVOKEINTERFACE: u8 = 0xb9;
    pub const NEW: u8 = 0xbb;
    pub const ATHROW: u8 = 0xbf;
    pub const CHECKCAST: u8 = 0xc0;
    pub const WIDE: u8 = 0xc4;
    pub const IFNULL: u8 = 0xc6;
    pub const IFNONNULL: u8 = 0xc7;
    pub const GOTO_W: u8 = 0xc8;
}

/// Verification type tags of a stack map frame entry
pub mod vt {
    pub const TOP: u8 = 0;
    pub const INTEGER: u8 = 1;
    pub const FLOAT: u8 = 2;
    pub const DOUBLE: u8 = 3;
    pub const LONG: u8 = 4;
    pub const NULL: u8 = 5;
    pub const UNINITIALIZED_THIS: u8 = 6;
    pub const OBJECT: u8 = 7;
    pub const UNINITIALIZED: u8 = 8;
}

pub const FULL_FRAME: u8 = 255;

/// Length of the instruction at `at`, operands included. `None` for an
/// undefined opcode or a switch whose header is cut off.
pub fn instruction_length(code: &[u8], at: usize) -> Option<usize> {
    let opcode = *code.get(at)?;
    let len = match opcode {
        0x00..=0x0f | 0x1a..=0x35 | 0x3b..=0x83 | 0x85..=0x98 | 0xac..=0xb1 | 0xbe | 0xbf
        | 0xc2 | 0xc3 => 1,
        0x10 | 0x12 | 0x15..=0x19 | 0x36..=0x3a | 0xa9 | 0xbc => 2,
        0x11 | 0x13 | 0x14 | 0x84 | 0x99..=0xa8 | 0xb2..=0xb8 | 0xbb | 0xbd | 0xc0 | 0xc1
        | 0xc6 | 0xc7 => 3,
        0xc5 => 4,
        0xb9 | 0xba | 0xc8 | 0xc9 => 5,
        op::WIDE => match code.get(at + 1)? {
            &op::IINC => 6,
            _ => 4,
        },
        op::TABLESWITCH | op::LOOKUPSWITCH => {
            // operands start at the next 4-byte boundary of the code array
            let base = (at + 4) & !3;
            let word = |i: usize| -> Option<i64> {
                let b = code.get(base + i * 4..base + i * 4 + 4)?;
                Some(i64::from(i32::from_be_bytes([b[0], b[1], b[2], b[3]])))
            };
            let tail = if opcode == op::TABLESWITCH {
                let (low, high) = (word(1)?, word(2)?);
                if high < low {
                    return None;
                }
                12 + (high - low + 1) * 4
            } else {
                let pairs = word(1)?;
                if pairs < 0 {
                    return None;
                }
                8 + pairs * 8
            };
            base - at + usize::try_from(tail).ok()?
        }
        _ => return None,
    };
    Some(len)
}
