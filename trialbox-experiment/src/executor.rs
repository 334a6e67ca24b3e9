use trialbox_core::{RawEventTrace, StateMachineSpec};

use crate::error::HardwareError;

/// Boundary to the behavior-box hardware.
///
/// `send` uploads a validated state machine; `run` starts it and blocks until the
/// trial exits. `Ok(None)` means the box or session was stopped mid-trial and no
/// trace exists. Exactly one trial is in flight at a time.
pub trait HardwareExecutor {
    type Handle;

    fn send(&mut self, spec: &StateMachineSpec) -> Result<Self::Handle, HardwareError>;

    fn run(&mut self, handle: Self::Handle) -> Result<Option<RawEventTrace>, HardwareError>;
}

impl<E: HardwareExecutor + ?Sized> HardwareExecutor for &mut E {
    type Handle = E::Handle;

    fn send(&mut self, spec: &StateMachineSpec) -> Result<Self::Handle, HardwareError> {
        (**self).send(spec)
    }

    fn run(&mut self, handle: Self::Handle) -> Result<Option<RawEventTrace>, HardwareError> {
        (**self).run(handle)
    }
}
