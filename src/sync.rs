// SPDX-License-Identifier: GPL-2.0

//! Synchronization primitives.
//!
//! The VFS uses fine-grained spinlocks with short critical sections;
//! nothing here is held across back-end calls except the per-handle
//! position lock, which orders all operations on one file descriptor.

pub use alloc::sync::{Arc, Weak};

pub use spin::Mutex as SpinLock;
pub use spin::MutexGuard as SpinLockGuard;
