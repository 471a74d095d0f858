// Record layout descriptor plus the opaque handle and status newtypes backends speak.
use bytemuck::Pod;

/// Layout of one stored record.
///
/// `variable_length_string` marks records whose text is owned by the backend
/// (one allocation per string) instead of being packed into `size` bytes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct RecordType {
    size: usize,
    variable_length_string: bool,
}

impl RecordType {
    pub fn fixed(size: usize) -> Self {
        Self {
            size,
            variable_length_string: false,
        }
    }

    /// Fixed-width, NUL-padded text field of `width` bytes.
    pub fn fixed_string(width: usize) -> Self {
        Self::fixed(width)
    }

    pub fn variable_string() -> Self {
        Self {
            size: std::mem::size_of::<usize>(),
            variable_length_string: true,
        }
    }

    pub fn of<T: Pod>() -> Self {
        Self::fixed(std::mem::size_of::<T>())
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_variable_length_string(&self) -> bool {
        self.variable_length_string
    }
}

/// Backend-side identifier for an open table or dataset.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Handle(i64);

impl Handle {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> i64 {
        self.0
    }
}

/// Raw failure code reported by a backend. Only failures are represented;
/// success is the `Ok` side of the backend's `Result`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Status(i32);

impl Status {
    pub const FAILURE: Status = Status(-1);
    pub const INVALID_HANDLE: Status = Status(-2);
    pub const NOT_FOUND: Status = Status(-3);
    pub const EXISTS: Status = Status(-4);
    pub const TYPE_MISMATCH: Status = Status(-5);
    pub const OUT_OF_RANGE: Status = Status(-6);
    pub const IO: Status = Status(-7);
    pub const CORRUPT: Status = Status(-8);
    pub const BUSY: Status = Status(-9);
    pub const UNSUPPORTED: Status = Status(-10);
    pub const PERMISSION: Status = Status(-11);

    pub fn new(code: i32) -> Self {
        Self(code)
    }

    pub fn code(&self) -> i32 {
        self.0
    }
}
