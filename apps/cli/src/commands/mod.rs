pub mod receive;
pub mod send;

use roomdrop_protocol::RoomCode;

/// Base of printed share links.
pub const SHARE_LINK_BASE: &str = "roomdrop://join";

pub fn print_code() {
    let code = RoomCode::generate();
    println!("code:     {code}");
    println!("identity: {}", code.connect_id());
    println!("key:      {}", code.key());
    println!("link:     {}", code.share_link(SHARE_LINK_BASE));
}

/// Shared style for transfer progress bars.
pub(crate) fn bar_style() -> indicatif::ProgressStyle {
    indicatif::ProgressStyle::with_template(
        "{prefix:>12} [{bar:30}] {bytes}/{total_bytes} ({bytes_per_sec})",
    )
    .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar())
    .progress_chars("=> ")
}
