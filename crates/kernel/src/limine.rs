use lazy_static::lazy_static;
use limine::file::File;
use limine::request::DeviceTreeBlobRequest;
use limine::request::ExecutableAddressRequest;
use limine::request::ExecutableFileRequest;
use limine::request::HhdmRequest;
use limine::request::MemoryMapRequest;
use limine::request::MpRequest;
use limine::request::RsdpRequest;

use limine::BaseRevision;
use limine::response::MemoryMapResponse;
use limine::response::MpResponse;

#[used]
#[unsafe(link_section = ".requests")]
static BASE_REVISION: BaseRevision = BaseRevision::with_revision(2);

#[used]
#[unsafe(link_section = ".requests")]
static MP_REQUEST: MpRequest = MpRequest::new();

// TODO: rewrite this whole module to be more generic
lazy_static! {
    pub static ref MP_RESPONSE: &'static MpResponse = get_mp_info();
}
fn get_mp_info() -> &'static MpResponse {
    let mp_response = MP_REQUEST.get_response().expect("no Limine MP Response");
    mp_response
}

#[used]
#[unsafe(link_section = ".requests")]
static DEVICE_TREE_REQUEST: DeviceTreeBlobRequest = DeviceTreeBlobRequest::new();

#[used]
#[unsafe(link_section = ".requests")]
static HHDM_REQUEST: HhdmRequest = HhdmRequest::new();

lazy_static! {
    pub static ref HHDM: usize = get_phy_offset();
}

#[used]
#[unsafe(link_section = ".requests")]
static RSDP_REQUEST: RsdpRequest = RsdpRequest::new();

#[used]
#[unsafe(link_section = ".requests")]
static KERNEL_ADDRESS_REQUEST: ExecutableAddressRequest = ExecutableAddressRequest::new();

#[used]
#[unsafe(link_section = ".requests")]
static KERNEL_FILE_REQUEST: ExecutableFileRequest = ExecutableFileRequest::new();

#[used]
#[unsafe(link_section = ".requests")]
static MMAP_REQUEST: MemoryMapRequest = MemoryMapRequest::new();

#[cfg(target_arch = "aarch64")]
pub fn device_tree_addr() -> Option<*const ()> {
    DEVICE_TREE_REQUEST.get_response().map(|r| r.dtb_ptr())
}

pub fn get_phy_offset() -> usize {
    HHDM_REQUEST.get_response().unwrap().offset() as usize
}

#[allow(unused)]
pub fn rsdp_addr() -> usize {
    RSDP_REQUEST.get_response().unwrap().address() as usize
}

pub fn kernel_file() -> &'static File {
    KERNEL_FILE_REQUEST.get_response().unwrap().file()
}

/// returns addr to the kernel image and it's size
pub fn kernel_image_info() -> (*const u8, usize) {
    let file = kernel_file();
    let size = file.size() as usize;
    let ptr = file.addr();

    (ptr, size)
}

pub fn mmap_request() -> &'static MemoryMapResponse {
    MMAP_REQUEST.get_response().unwrap()
}
