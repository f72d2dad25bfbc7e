// SPDX-License-Identifier: GPL-2.0

//! Per-process state consumed by the VFS: identity, fd table, root and
//! working directory.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::fs::fdtable::FdTable;
use crate::fs::path::Path;
use crate::sync::{Arc, SpinLock};

/// Filesystem view of a task: process root and current working directory.
pub struct TaskFs {
	/// Process root `(mount, dentry)` pair. Absolute paths rewind here.
	pub root: Option<Path>,
	/// Current working directory pair. Relative paths start here.
	pub pwd: Option<Path>,
}

/// The slice of a process the VFS cares about.
///
/// Real kernels hang this off the scheduler's task structure; here it is a
/// standalone object so tests can create as many as they need.
pub struct Task {
	/// Task id
	pub tid: u32,
	/// Effective user id
	pub euid: AtomicU32,
	/// Effective group id
	pub egid: AtomicU32,
	/// Open-file table, shared on clone
	pub fdtable: Arc<FdTable>,
	/// Root and cwd
	pub fs: SpinLock<TaskFs>,
}

impl Task {
	/// Create a task with no filesystem view yet. Used while bootstrapping
	/// the root mount, before any path can resolve.
	pub fn bare(tid: u32) -> Arc<Task> {
		Arc::new(Task {
			tid,
			euid: AtomicU32::new(0),
			egid: AtomicU32::new(0),
			fdtable: FdTable::new(),
			fs: SpinLock::new(TaskFs { root: None, pwd: None }),
		})
	}

	/// Create a task anchored at `root` (both root and cwd).
	pub fn with_root(tid: u32, root: Path) -> Arc<Task> {
		let pwd = root.get();
		Arc::new(Task {
			tid,
			euid: AtomicU32::new(0),
			egid: AtomicU32::new(0),
			fdtable: FdTable::new(),
			fs: SpinLock::new(TaskFs { root: Some(root), pwd: Some(pwd) }),
		})
	}

	/// Fork-style duplication: clones the fd table (bumping file refcounts)
	/// and the root/cwd anchors.
	pub fn fork(&self, tid: u32) -> Arc<Task> {
		let fs = self.fs.lock();
		Arc::new(Task {
			tid,
			euid: AtomicU32::new(self.euid.load(Ordering::Relaxed)),
			egid: AtomicU32::new(self.egid.load(Ordering::Relaxed)),
			fdtable: self.fdtable.copy(),
			fs: SpinLock::new(TaskFs {
				root: fs.root.as_ref().map(|p| p.get()),
				pwd: fs.pwd.as_ref().map(|p| p.get()),
			}),
		})
	}

	/// Effective uid.
	pub fn uid(&self) -> u32 {
		self.euid.load(Ordering::Relaxed)
	}

	/// Effective gid.
	pub fn gid(&self) -> u32 {
		self.egid.load(Ordering::Relaxed)
	}

	/// Process root pair, if set.
	pub fn root_path(&self) -> Option<Path> {
		self.fs.lock().root.as_ref().map(|p| p.get())
	}

	/// Working-directory pair, if set.
	pub fn pwd_path(&self) -> Option<Path> {
		self.fs.lock().pwd.as_ref().map(|p| p.get())
	}

	/// Swap the process root, returning the old pair for release.
	pub fn set_root(&self, new_root: Path) -> Option<Path> {
		let mut fs = self.fs.lock();
		fs.root.replace(new_root)
	}

	/// Swap the working directory, returning the old pair for release.
	pub fn set_pwd(&self, new_pwd: Path) -> Option<Path> {
		let mut fs = self.fs.lock();
		fs.pwd.replace(new_pwd)
	}
}
