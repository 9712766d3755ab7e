//! Plain-text message bodies posted to channel webhooks.

use nem_push_domain::model::{Address, MosaicWithDivisibility, TransferNotice};

pub const SUBSCRIBED: &str = "Address registered";
pub const UNSUBSCRIBED: &str = "Address unregistered";

pub fn transfer(notice: &TransferNotice) -> String {
    let header = if notice.is_recipient {
        "Received XEM / mosaics"
    } else {
        "Sent XEM / mosaics"
    };
    let message = if notice.message.is_empty() {
        String::new()
    } else {
        format!("Message: {}\n", decode_message(&notice.message))
    };
    format!(
        "{header}\n{}\n{message}{}\n",
        notice.label,
        mosaic_lines(&notice.mosaics)
    )
}

pub fn balance(label: &str, mosaics: &[MosaicWithDivisibility]) -> String {
    format!("{label}\nHoldings (XEM / mosaics)\n{}\n", mosaic_lines(mosaics))
}

pub fn balance_failure(address: &Address) -> String {
    format!("{address}\nBalance lookup failed")
}

pub fn confirmation(action: &str, address: &Address) -> String {
    format!("{action}: {address}")
}

/// One line per address, `name address` when a name is set.
pub fn address_list(entries: &[(Address, String)]) -> String {
    let lines: Vec<String> = entries
        .iter()
        .map(|(address, name)| {
            if name.is_empty() {
                address.to_string()
            } else {
                format!("{name} {address}")
            }
        })
        .collect();
    format!("Watched addresses\n{}\n", lines.join("\n"))
}

fn mosaic_lines(mosaics: &[MosaicWithDivisibility]) -> String {
    mosaics
        .iter()
        .map(|mosaic| format!("{}  {}", mosaic.full_name, mosaic.rendered_amount()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Transfer payloads arrive hex-encoded; undecodable input is shown raw.
fn decode_message(payload: &str) -> String {
    match hex::decode(payload) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => payload.to_string(),
    }
}
