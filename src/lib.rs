//! cmsdb - ordered navigation and content blocks on a Git-backed store
//!
//! The core is the ordering engine in [`ordering`]: order-index allocation,
//! the reparent cycle guard, the delete guard and atomic batch reorders. It is
//! shared by the navigation tree and the page-scoped content-block lists in
//! [`db`], and runs against any [`gateway::Gateway`]. The Git gateway makes
//! every committed change a commit on `main`.
//!
//! # Example
//!
//! ```no_run
//! use cmsdb::db::Database;
//! use cmsdb::model::{NewContentBlock, NewNavigationItem};
//!
//! let db = Database::open("./site").unwrap();
//! let home = db.navigation().create(NewNavigationItem::new("Home").url("/")).unwrap();
//! db.navigation().create(NewNavigationItem::new("Team").parent(home.id.clone())).unwrap();
//! db.content().create(NewContentBlock::new(home.id, "hero")).unwrap();
//! ```

pub mod db;
pub mod gateway;
pub mod model;
pub mod ordering;
pub mod storage;
pub mod transaction;
