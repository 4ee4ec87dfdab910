//! CSV export of stored auction records.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tracing::info;

use crate::models::AuctionRecord;

/// Header row plus one line per record. Missing values are empty cells.
pub fn write_csv<W: Write>(records: &[AuctionRecord], out: W) -> Result<usize> {
    let mut writer = csv::Writer::from_writer(out);
    for record in records {
        writer
            .serialize(record)
            .with_context(|| format!("CSV row for {}", record.address))?;
    }
    writer.flush()?;
    Ok(records.len())
}

pub fn export_to_path(records: &[AuctionRecord], path: &Path) -> Result<usize> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("Cannot create {:?}", dir))?;
    }
    let file = File::create(path).with_context(|| format!("Cannot create {:?}", path))?;
    let n = write_csv(records, file)?;
    info!("Wrote {} records to {:?}", n, path);
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuctionResult, AustralianState, Source};
    use chrono::NaiveDate;

    fn record(address: &str, result: AuctionResult, price: Option<i64>) -> AuctionRecord {
        AuctionRecord {
            address: address.into(),
            suburb: "Paddington".into(),
            state: AustralianState::Nsw,
            postcode: "2021".into(),
            price,
            result,
            auction_date: NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
            source: Source::Rea,
            property_type: "Terrace".into(),
            bedrooms: Some(3),
            bathrooms: None,
            car_spaces: None,
            agent_name: Some("Jane Citizen".into()),
            agency_name: None,
            listing_url: None,
        }
    }

    #[test]
    fn test_write_csv() {
        let records = vec![
            record("5 Glenmore Road", AuctionResult::Sold, Some(2_150_000)),
            record("18 Union Street", AuctionResult::PassedIn, None),
        ];
        let mut buf = Vec::new();
        assert_eq!(write_csv(&records, &mut buf).unwrap(), 2);

        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("address,suburb,state,postcode,price,result,auction_date,source"));
        assert_eq!(
            lines[1],
            "5 Glenmore Road,Paddington,NSW,2021,2150000,sold,2024-03-09,rea,Terrace,3,,,Jane Citizen,,"
        );
        assert!(lines[2].contains(",,passed_in,"));
    }

    #[test]
    fn test_empty_export_writes_nothing() {
        let mut buf = Vec::new();
        assert_eq!(write_csv(&[], &mut buf).unwrap(), 0);
        assert!(buf.is_empty());
    }
}
