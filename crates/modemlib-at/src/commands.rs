//! AT command builders.
//!
//! Every command is terminated with `\r`. The PDU payload that follows
//! `AT+CMGS` is terminated with Ctrl-Z (`0x1A`) instead.

use modemlib_core::types::PduSegment;

/// Carriage return terminating a command line.
pub const CR: &str = "\r";

/// Ctrl-Z, which ends a PDU payload.
pub const CTRL_Z: char = '\x1A';

fn cmd(body: &str) -> String {
    format!("{body}{CR}")
}

/// The initialization sequence sent by `start`, in order.
///
/// Enables connected-line and caller-line identification, routes audio to
/// the secondary channel, turns on verbose errors, has new SMS pushed as
/// `+CMT` (and stored ones announced as `+CMTI`), and unlocks the SIM.
pub fn init_sequence(pin: &str) -> Vec<String> {
    vec![
        cmd("AT"),
        cmd("AT+COLP=1"),
        cmd("AT+QAUDCH=1"),
        cmd("AT+CMEE=2"),
        cmd("AT+CLIP=1"),
        cmd("AT+CNMI=2,2,0,1,1"),
        cmd(&format!("AT+CPIN=\"{pin}\"")),
    ]
}

/// Place a voice call.
pub fn dial(number: &str) -> String {
    cmd(&format!("ATD{number};"))
}

/// Answer an incoming call.
pub fn answer() -> String {
    cmd("ATA")
}

/// End the current call.
pub fn hangup() -> String {
    cmd("ATH")
}

/// Query signal quality.
pub fn signal_quality() -> String {
    cmd("AT+CSQ")
}

/// Select PDU message format.
pub fn pdu_mode() -> String {
    cmd("AT+CMGF=0")
}

/// Read the stored message at `id`.
pub fn read_sms(id: u32) -> String {
    cmd(&format!("AT+CMGR={id}"))
}

/// Announce a PDU of `tpdu_len` octets.
pub fn send_sms_header(tpdu_len: usize) -> String {
    cmd(&format!("AT+CMGS={tpdu_len}"))
}

/// The PDU payload following [`send_sms_header`].
pub fn send_sms_payload(segment: &PduSegment) -> String {
    format!("{}{CTRL_Z}", segment.hex)
}

/// Both writes for one outgoing segment.
pub fn send_segment(segment: &PduSegment) -> [String; 2] {
    [send_sms_header(segment.tpdu_len), send_sms_payload(segment)]
}
