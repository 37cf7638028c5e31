//! Chroot controller (component M): directory lifecycle, locking, and
//! delegation to the privileged helper's fixed wire protocol.

mod controller;
mod helper;

pub use controller::{ChrootBase, ChrootController, ReservedChroot};
pub use helper::{ChrootHelper, Escalation, ExternalHelper, SENTINEL_FILE};
