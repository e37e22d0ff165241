//! `int 0x80` syscall gate. Arguments are passed the same way as the Linux
//! x86_64 `syscall` instruction (rax = number, rdi, rsi, rdx, r10, r8, r9),
//! avoiding rcx/r11 since those aren't clobbered by `int` the way they are
//! by `syscall`/`sysret`. Return value comes back in rax.

use core::arch::global_asm;

unsafe extern "x86-interrupt" {
    pub fn syscall_base();
}

#[unsafe(no_mangle)]
extern "C" fn syscall_dispatch(
    num: u64,
    a1: u64,
    a2: u64,
    a3: u64,
    a4: u64,
    a5: u64,
    a6: u64,
) -> i64 {
    crate::syscall::dispatch(num, a1, a2, a3, a4, a5, a6)
}

global_asm!(
    r#"
.global syscall_base
syscall_base:
    push rcx
    push r11
    push rdi
    push rsi
    push rdx
    push r10
    push r8
    push r9

    mov r11, rsp
    mov rdi, rax
    mov rsi, [r11 + 40]
    mov rdx, [r11 + 32]
    mov rcx, [r11 + 24]
    mov r8,  [r11 + 16]
    mov r9,  [r11 + 8]
    push qword [r11 + 0]
    and rsp, -16
    call {syscall_dispatch}
    mov rsp, r11

    pop r9
    pop r8
    pop r10
    pop rdx
    pop rsi
    pop rdi
    pop r11
    pop rcx
    iretq
"#,
    syscall_dispatch = sym syscall_dispatch,
);
