use crate::FrameAllocError;

/// What the allocator does when it cannot continue.
///
/// Kernel implementations never return. Test doubles may record the call and
/// return, in which case the failing operation reports the error instead.
pub trait Halt {
    fn halt(&self, reason: &FrameAllocError);
}

/// Stops the current CPU for good.
#[derive(Copy, Clone, Debug, Default)]
pub struct HaltLoop;

impl Halt for HaltLoop {
    fn halt(&self, _reason: &FrameAllocError) {
        loop {
            halt_cpu();
        }
    }
}

#[inline]
fn halt_cpu() {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        core::arch::asm!("cli", "hlt", options(nomem, nostack));
    }

    #[cfg(not(target_arch = "x86_64"))]
    core::hint::spin_loop();
}
