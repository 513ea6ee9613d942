//! Supply/battery readout.

use embedded_io_async::{Read, Write};

use crate::client::{CavliClient, DEFAULT_TERMINATORS};
use crate::command::Command;
use crate::config::CellularConfig;
use crate::error::Error;
use crate::module_timing::command_timeout;

/// `+CBC: <charging>,<percent>,<millivolts>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BatteryStatus {
    pub charging: bool,
    pub percent: u8,
    pub millivolts: u16,
}

pub trait Battery {
    async fn battery_status(&mut self) -> Result<BatteryStatus, Error>;
}

impl<W, C, const N: usize, const L: usize> Battery for CavliClient<W, C, N, L>
where
    W: Read + Write,
    C: CellularConfig,
{
    async fn battery_status(&mut self) -> Result<BatteryStatus, Error> {
        self.send_at(&Command::GetBatteryStatus).await?;
        let (index, data) = self
            .wait_response_capture(command_timeout(), DEFAULT_TERMINATORS)
            .await?;
        if index != 0 {
            return Err(Error::Command);
        }
        let text = core::str::from_utf8(&data).map_err(|_| Error::InvalidResponse)?;
        parse_battery(text).ok_or(Error::InvalidResponse)
    }
}

fn parse_battery(text: &str) -> Option<BatteryStatus> {
    let at = text.find("+CBC:")?;
    let line = text[at + 5..].lines().next()?;

    let mut fields = line.split(',');
    let charging = fields.next()?.trim().parse::<u8>().ok()? != 0;
    let percent = fields.next()?.trim().parse::<u8>().ok()?;
    let millivolts = fields.next()?.trim().parse::<u16>().ok()?;

    Some(BatteryStatus {
        charging,
        percent,
        millivolts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NoPinConfig;
    use crate::test_helpers::MockSerial;

    #[test]
    fn parses_status_line() {
        let status = parse_battery("\r\n+CBC: 1,75,3862\r\n\r\nOK\r\n").unwrap();
        assert_eq!(
            status,
            BatteryStatus {
                charging: true,
                percent: 75,
                millivolts: 3862,
            }
        );
    }

    #[test]
    fn rejects_missing_fields() {
        assert!(parse_battery("+CBC: 0,75").is_none());
        assert!(parse_battery("OK").is_none());
    }

    #[tokio::test]
    async fn reads_battery_over_the_wire() {
        let mut at: CavliClient<MockSerial, NoPinConfig, 8, 64> = CavliClient::new(
            MockSerial::script(b"\r\n+CBC: 0,93,4103\r\n\r\nOK\r\n"),
            NoPinConfig,
        );
        let status = at.battery_status().await.unwrap();
        assert!(!status.charging);
        assert_eq!(status.percent, 93);
        assert_eq!(status.millivolts, 4103);
    }
}
