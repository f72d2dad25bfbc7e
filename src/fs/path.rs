// SPDX-License-Identifier: GPL-2.0

//! Component-by-component path resolution.
//!
//! The walker consumes the context's remaining-path cursor one component
//! at a time: dot is skipped, dot-dot pops across mount roots (and never
//! escapes the process root), real components go through the dentry-layer
//! lookup and, when the cache answers with a negative entry, through the
//! back-end via the inode layer. Creation verbs take over on the final
//! component, mountpoints are crossed to a fixpoint, and symlinks splice
//! their target in front of the cursor under a per-walk budget.
//!
//! Every failure path releases only references the walker itself took
//! since entry; whatever remains in the context is released by its drop.

use alloc::string::String;

use crate::error::{Error, Result};
use crate::fs::dentry::{dentry_dispatch, dget, dput, Dentry};
use crate::fs::fcontext::{with_action, Action, FsContext, LookupFlags, OpOutput};
use crate::fs::inode::inode_dispatch;
use crate::fs::mount::{mntget, mntput, VfsMount};
use crate::fs::qstr::Qstr;
use crate::fs::super_block::FsCapabilities;
use crate::fs::{Vfs, NAME_MAX};
use crate::sync::Arc;

/// Per-walk symlink budget: the ninth crossing in a chain fails.
pub const MAX_SYMLINKS: u32 = 8;

/// A resolved position in the namespace: a dentry and the mount it was
/// reached through. Holding a `Path` implies holding one reference on
/// each; `get`/`put` manage them.
pub struct Path {
	pub mnt: Arc<VfsMount>,
	pub dentry: Arc<Dentry>,
}

impl Path {
	/// Duplicate with fresh references.
	pub fn get(&self) -> Path {
		Path {
			mnt: mntget(&self.mnt),
			dentry: dget(&self.dentry),
		}
	}

	/// Release both references.
	pub fn put(self, vfs: &Vfs) {
		dput(vfs, &self.dentry);
		mntput(vfs, &self.mnt);
	}

	/// Same `(mount, dentry)` pair.
	pub fn same_as(&self, other: &Path) -> bool {
		Arc::ptr_eq(&self.mnt, &other.mnt) && Arc::ptr_eq(&self.dentry, &other.dentry)
	}
}

/// One path component after separator handling.
#[derive(Debug, PartialEq, Eq)]
pub enum Component {
	Dot,
	DotDot,
	Name(String),
}

/// Split the next component off the front of `remaining`, consuming
/// leading separators. Returns `None` once only separators (or nothing)
/// are left.
pub fn split_component(remaining: &mut String) -> Option<Component> {
	let skip = remaining.bytes().take_while(|&b| b == b'/').count();
	if skip > 0 {
		remaining.drain(..skip);
	}
	if remaining.is_empty() {
		return None;
	}
	let end = remaining.find('/').unwrap_or(remaining.len());
	let comp: String = remaining.drain(..end).collect();
	Some(match comp.as_str() {
		"." => Component::Dot,
		".." => Component::DotDot,
		_ => Component::Name(comp),
	})
}

/// Path-layer intent dispatcher.
pub fn path_dispatch(fctx: &mut FsContext<'_>) -> Result<()> {
	match fctx.fc_action {
		Action::PathLookup => walk(fctx),
		_ => Err(Error::NotImplemented),
	}
}

/// Which creation verb the walker hands to the inode layer when the last
/// component is negative and the walk carries a create intent.
fn creation_verb(action: Action) -> Action {
	match action {
		Action::Open | Action::Create => Action::Create,
		Action::Mkdir => Action::Mkdir,
		Action::Mknod => Action::Mknod,
		Action::Symlink => Action::Symlink,
		Action::Link => Action::Link,
		_ => Action::None,
	}
}

/// Anchor the context: current pair from the file handle or the task's
/// cwd when unset, rewound to the process root for absolute paths.
fn anchor(fctx: &mut FsContext<'_>, flags: LookupFlags) -> Result<()> {
	if fctx.fc_dentry.is_none() || fctx.fc_mount.is_none() {
		let start = if let Some(f) = &fctx.fc_file {
			f.f_path.get()
		} else {
			fctx.fc_task
				.as_ref()
				.and_then(|t| t.pwd_path())
				.ok_or(Error::NoSuchEntry)?
		};
		fctx.replace_pair(start.mnt, start.dentry);
	}
	if fctx.fc_remaining.starts_with('/') && !flags.contains(LookupFlags::IN_ROOT) {
		let root = fctx
			.fc_task
			.as_ref()
			.and_then(|t| t.root_path())
			.ok_or(Error::NoSuchEntry)?;
		fctx.replace_pair(root.mnt, root.dentry);
	}
	Ok(())
}

/// Cross every mount anchored on the current dentry, to a fixpoint.
pub(crate) fn cross_mounts(fctx: &mut FsContext<'_>) -> Result<()> {
	loop {
		let d = fctx.current_dentry()?;
		if !d.is_mountpoint() {
			return Ok(());
		}
		let m = fctx.current_mount()?;
		match fctx.vfs.mounts.lookup(&m, &d) {
			Some(child) => {
				let root = dget(&child.mnt_root);
				fctx.replace_pair(child, root);
			}
			None => return Ok(()),
		}
	}
}

/// One `..` step: pop across mount roots to the anchor they hang from,
/// then move to the parent. The process root (or the walk's starting
/// point under BENEATH) is its own parent.
fn step_dotdot(fctx: &mut FsContext<'_>, clamp: Option<(usize, usize)>) -> Result<()> {
	loop {
		let d = fctx.current_dentry()?;
		let m = fctx.current_mount()?;

		let at_clamp = if let Some((mp, dp)) = clamp {
			Arc::as_ptr(&m) as usize == mp && Arc::as_ptr(&d) as usize == dp
		} else if let Some(task) = &fctx.fc_task {
			let fs = task.fs.lock();
			match &fs.root {
				Some(root) => Arc::ptr_eq(&root.mnt, &m) && Arc::ptr_eq(&root.dentry, &d),
				None => false,
			}
		} else {
			false
		};
		if at_clamp {
			return Ok(());
		}

		if Arc::ptr_eq(&d, &m.mnt_root) {
			match m.attached_at() {
				Some(anchor) => {
					// Pop to the mountpoint, then re-check: the mountpoint
					// may itself be the root of a stacked mount.
					fctx.replace_pair(mntget(&anchor.mnt), dget(&anchor.dentry));
					continue;
				}
				None => return Ok(()),
			}
		}

		let parent = d.parent_or_self();
		let parent = dget(&parent);
		fctx.replace_dentry(parent);
		return Ok(());
	}
}

fn walk(fctx: &mut FsContext<'_>) -> Result<()> {
	let flags = fctx.lookup_flags();

	if fctx.fc_remaining.is_empty() && !flags.contains(LookupFlags::EMPTY) {
		return Err(Error::InvalidInput);
	}

	anchor(fctx, flags)?;

	let clamp = if flags.contains(LookupFlags::BENEATH) {
		Some((
			Arc::as_ptr(&fctx.current_mount()?) as usize,
			Arc::as_ptr(&fctx.current_dentry()?) as usize,
		))
	} else {
		None
	};

	if flags.contains(LookupFlags::DOWN) && !flags.contains(LookupFlags::NO_XDEV) {
		cross_mounts(fctx)?;
	}

	let mut budget = MAX_SYMLINKS;
	let aflags = fctx.fc_action_flags;

	loop {
		let comp = match split_component(&mut fctx.fc_remaining) {
			Some(c) => c,
			None => break,
		};
		match comp {
			Component::Dot => continue,
			Component::DotDot => {
				step_dotdot(fctx, clamp)?;
				continue;
			}
			Component::Name(name) => {
				if name.len() > NAME_MAX {
					return Err(Error::NameTooLong);
				}
				let is_last = fctx.fc_remaining.bytes().all(|b| b == b'/');
				let trailing_dir = is_last && !fctx.fc_remaining.is_empty();

				let parent = fctx.current_dentry()?;
				let fold = parent.d_sb.s_capabilities.contains(FsCapabilities::CASE_INSENSITIVE);
				fctx.fc_name = Some(Qstr::from_bytes(name.as_bytes(), fold));

				with_action(fctx, Action::Lookup, aflags, dentry_dispatch)?;

				// Populate (or re-validate) through the back-end.
				let d = fctx.current_dentry()?;
				let consult_backend = if d.is_negative() {
					!flags.contains(LookupFlags::CACHED)
				} else {
					flags.contains(LookupFlags::REVAL)
				};
				if consult_backend {
					match with_action(fctx, Action::Lookup, aflags, inode_dispatch) {
						Ok(()) | Err(Error::NoSuchEntry) => {}
						Err(e) => return Err(e),
					}
				}

				let d = fctx.current_dentry()?;
				if d.is_negative() {
					if is_last && flags.contains(LookupFlags::RENAME_TARGET) {
						break;
					}
					if is_last && flags.contains(LookupFlags::CREATE) {
						let verb = creation_verb(fctx.fc_intent);
						if verb == Action::None {
							return Err(Error::NoSuchEntry);
						}
						with_action(fctx, verb, aflags, inode_dispatch)?;
						break;
					}
					return Err(Error::NoSuchEntry);
				}

				if is_last
					&& flags.contains(LookupFlags::CREATE)
					&& flags.contains(LookupFlags::EXCL)
				{
					return Err(Error::AlreadyExists);
				}

				if fctx.current_dentry()?.is_mountpoint() {
					if flags.contains(LookupFlags::NO_XDEV) {
						return Err(Error::NotSupported);
					}
					cross_mounts(fctx)?;
				}

				let d = fctx.current_dentry()?;
				if d.is_symlink() {
					if flags.contains(LookupFlags::NO_SYMLINKS) {
						return Err(Error::LinkLoop);
					}
					let follow = !is_last || flags.contains(LookupFlags::FOLLOW);
					if follow {
						if budget == 0 {
							return Err(Error::LinkLoop);
						}
						budget -= 1;
						with_action(fctx, Action::Readlink, 0, inode_dispatch)?;
						let target = match fctx.fc_output.take() {
							OpOutput::Link(s) => s,
							_ => return Err(Error::InvalidInput),
						};
						// Step back to the directory holding the link and
						// splice the target in front of the remainder.
						let parent = d.parent_or_self();
						let parent = dget(&parent);
						fctx.replace_dentry(parent);
						let rest = core::mem::take(&mut fctx.fc_remaining);
						let rest = rest.trim_start_matches('/');
						fctx.fc_remaining = if rest.is_empty() {
							target
						} else {
							alloc::format!("{}/{}", target.trim_end_matches('/'), rest)
						};
						if fctx.fc_remaining.starts_with('/')
							&& !flags.contains(LookupFlags::IN_ROOT)
						{
							let root = fctx
								.fc_task
								.as_ref()
								.and_then(|t| t.root_path())
								.ok_or(Error::NoSuchEntry)?;
							fctx.replace_pair(root.mnt, root.dentry);
						}
						continue;
					}
				}

				let d = fctx.current_dentry()?;
				if is_last {
					if (flags.contains(LookupFlags::DIRECTORY) || trailing_dir) && !d.is_dir() {
						return Err(Error::NotDirectory);
					}
					if flags.contains(LookupFlags::REQUIRE_REGULAR) && !d.is_regular() {
						return Err(Error::InvalidInput);
					}
					if flags.contains(LookupFlags::REQUIRE_SYMLINK) && !d.is_symlink() {
						return Err(Error::InvalidInput);
					}
				} else if !d.is_dir() {
					return Err(Error::NotDirectory);
				}
			}
		}
	}

	if flags.contains(LookupFlags::MOUNTPOINT) && !flags.contains(LookupFlags::NO_XDEV) {
		cross_mounts(fctx)?;
	}

	// An empty walk still has to satisfy an explicit directory demand.
	if flags.contains(LookupFlags::DIRECTORY) {
		let d = fctx.current_dentry()?;
		if !d.is_dir() {
			return Err(Error::NotDirectory);
		}
	}
	Ok(())
}
