//! Network-provided time of day.

use embedded_io_async::{Read, Write};

use crate::client::{CavliClient, DEFAULT_TERMINATORS};
use crate::command::Command;
use crate::config::CellularConfig;
use crate::error::Error;
use crate::module_timing::command_timeout;

/// Calendar time as reported by `+CCLK`, with the timezone offset in
/// quarter hours east of GMT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NetworkTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub timezone_quarters: i8,
}

pub trait Clock {
    async fn network_time(&mut self) -> Result<NetworkTime, Error>;
}

impl<W, C, const N: usize, const L: usize> Clock for CavliClient<W, C, N, L>
where
    W: Read + Write,
    C: CellularConfig,
{
    async fn network_time(&mut self) -> Result<NetworkTime, Error> {
        self.send_at(&Command::GetClock).await?;
        let (index, data) = self
            .wait_response_capture(command_timeout(), DEFAULT_TERMINATORS)
            .await?;
        if index != 0 {
            return Err(Error::Command);
        }
        let text = core::str::from_utf8(&data).map_err(|_| Error::InvalidResponse)?;
        parse_clock(text).ok_or(Error::InvalidResponse)
    }
}

/// `+CCLK: "yy/MM/dd,hh:mm:ss±zz"`
fn parse_clock(text: &str) -> Option<NetworkTime> {
    let open = text.find('"')? + 1;
    let len = text[open..].find('"')?;
    let stamp = &text[open..open + len];

    let (date, time) = stamp.split_once(',')?;

    let mut date_fields = date.split('/');
    let year = 2000 + date_fields.next()?.parse::<u16>().ok()?;
    let month = date_fields.next()?.parse::<u8>().ok()?;
    let day = date_fields.next()?.parse::<u8>().ok()?;

    // The timezone sign splits the time from the offset.
    let sign_at = time.rfind(|c| c == '+' || c == '-')?;
    let (hms, zone) = time.split_at(sign_at);
    let timezone_quarters = zone.parse::<i8>().ok()?;

    let mut time_fields = hms.split(':');
    let hour = time_fields.next()?.parse::<u8>().ok()?;
    let minute = time_fields.next()?.parse::<u8>().ok()?;
    let second = time_fields.next()?.parse::<u8>().ok()?;

    Some(NetworkTime {
        year,
        month,
        day,
        hour,
        minute,
        second,
        timezone_quarters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NoPinConfig;
    use crate::test_helpers::MockSerial;

    #[test]
    fn parses_positive_offset() {
        let time = parse_clock("+CCLK: \"24/03/08,15:32:10+04\"").unwrap();
        assert_eq!(
            time,
            NetworkTime {
                year: 2024,
                month: 3,
                day: 8,
                hour: 15,
                minute: 32,
                second: 10,
                timezone_quarters: 4,
            }
        );
    }

    #[test]
    fn parses_negative_offset() {
        let time = parse_clock("+CCLK: \"23/12/31,23:59:59-28\"").unwrap();
        assert_eq!(time.year, 2023);
        assert_eq!(time.timezone_quarters, -28);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_clock("+CCLK: banana").is_none());
        assert!(parse_clock("\"24/03/08\"").is_none());
    }

    #[tokio::test]
    async fn reads_clock_over_the_wire() {
        let mut at: CavliClient<MockSerial, NoPinConfig, 8, 64> = CavliClient::new(
            MockSerial::script(b"\r\n+CCLK: \"24/03/08,15:32:10+04\"\r\n\r\nOK\r\n"),
            NoPinConfig,
        );
        let time = at.network_time().await.unwrap();
        assert_eq!(time.hour, 15);
        assert_eq!(time.day, 8);
    }
}
