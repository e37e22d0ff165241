use core::arch::asm;
use core::cell::SyncUnsafeCell;

use serde::Serialize;
use spin::Lazy;

/// How many TSC ticks make up one millisecond on the boot CPU, filled in by
/// [`super::interrupts::apic::calibrate_tsc`] during `init_phase2`.
pub static TICKS_PER_MS: SyncUnsafeCell<u64> = SyncUnsafeCell::new(0);

/// How many local APIC timer ticks make up one millisecond, filled in by
/// [`super::interrupts::apic::enable_apic_timer`]'s calibration pass.
pub static APIC_TIMER_TICKS_PER_MS: SyncUnsafeCell<u64> = SyncUnsafeCell::new(0);

#[derive(Serialize, Debug)]
pub struct CpuInfo {
    vendor_id: heapless::String<12>,
    model: heapless::String<48>,
    core_count: u8,
}

impl CpuInfo {
    fn cpuid(leaf: u32) -> (u32, u32, u32, u32) {
        let (eax, ebx, ecx, edx);
        unsafe {
            asm!(
                "cpuid",
                inout("eax") leaf => eax,
                out("ebx") ebx,
                out("ecx") ecx,
                out("edx") edx,
            );
        }
        (eax, ebx, ecx, edx)
    }

    fn fetch_vendor_id() -> heapless::String<12> {
        let (_, ebx, ecx, edx) = Self::cpuid(0);
        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&ebx.to_le_bytes());
        bytes[4..8].copy_from_slice(&edx.to_le_bytes());
        bytes[8..12].copy_from_slice(&ecx.to_le_bytes());
        heapless::String::from_utf8(heapless::Vec::from_slice(&bytes).unwrap())
            .unwrap_or_default()
    }

    fn fetch_model() -> heapless::String<48> {
        let mut bytes = [0u8; 48];
        for (i, leaf) in (0x80000002u32..=0x80000004u32).enumerate() {
            let (eax, ebx, ecx, edx) = Self::cpuid(leaf);
            let off = i * 16;
            bytes[off..off + 4].copy_from_slice(&eax.to_le_bytes());
            bytes[off + 4..off + 8].copy_from_slice(&ebx.to_le_bytes());
            bytes[off + 8..off + 12].copy_from_slice(&ecx.to_le_bytes());
            bytes[off + 12..off + 16].copy_from_slice(&edx.to_le_bytes());
        }
        let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        heapless::String::from_utf8(heapless::Vec::from_slice(&bytes[..len]).unwrap())
            .unwrap_or_default()
    }

    pub fn fetch() -> Self {
        Self {
            vendor_id: Self::fetch_vendor_id(),
            model: Self::fetch_model(),
            core_count: crate::arch::available_cpus() as u8,
        }
    }
}

pub static CPU_INFO: Lazy<CpuInfo> = Lazy::new(CpuInfo::fetch);

#[inline(always)]
fn rdtsc() -> u64 {
    let (low, high): (u32, u32);
    unsafe {
        asm!("rdtsc", out("eax") low, out("edx") high, options(nomem, nostack));
    }
    ((high as u64) << 32) | (low as u64)
}

/// Returns the number of milliseconds since the boot CPU's TSC was calibrated.
pub fn time() -> u64 {
    let ticks_per_ms = unsafe { *TICKS_PER_MS.get() };
    if ticks_per_ms == 0 {
        return 0;
    }
    rdtsc() / ticks_per_ms
}
