//! Embeds the demo user-task program as a data blob inside the kernel
//! image, assembled for the same target rather than shipped as a separate
//! build artifact.

core::arch::global_asm!(include_str!("user_task.S"));

extern "C" {
    static user_task_start: u8;
    static user_task_end: u8;
}

/// The blob `usersched::init` maps and copies into each task's code range.
pub fn blob() -> &'static [u8] {
    // SAFETY: `user_task_start`/`user_task_end` bound the `.rodata.user_task`
    // section linked into this image; the range between them is immutable
    // for the life of the kernel.
    unsafe {
        let start = &user_task_start as *const u8;
        let end = &user_task_end as *const u8;
        core::slice::from_raw_parts(start, end as usize - start as usize)
    }
}
