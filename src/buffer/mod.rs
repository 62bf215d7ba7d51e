//! Growable binary buffers
//!
//! Two building blocks used by every on-disk record:
//!
//! ```text
//! ByteArray      [b0 b1 b2 ... bN | unused capacity]   (doubles when full)
//! ByteArrayList  i32 count
//!                ├─→ i32 len, len bytes
//!                ├─→ i32 len, len bytes
//!                └─→ i32 0            (absent entry)
//! ```
//!
//! All integers are big-endian.

pub mod byte_array;
pub mod byte_array_list;

pub use byte_array::ByteArray;
pub use byte_array_list::ByteArrayList;
