use std::fmt::Display;

use anyhow::Result;
use ansi_term::Colour::Red;
use chrono::{DateTime, Local, Utc};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};
use now::DateTimeNow;

use crate::{client::ApiClient, storage::entities::MeasurementEntity, utils::time::next_day_start};

use super::Args;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortField {
    /// Chronological order by creation time.
    Date,
    /// Numeric order by elapsed milliseconds.
    Time,
}

impl Display for SortField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortField::Date => write!(f, "date"),
            SortField::Time => write!(f, "time"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl Display for SortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "asc"),
            SortDirection::Desc => write!(f, "desc"),
        }
    }
}

#[derive(Debug, Parser)]
pub struct HistoryCommand {
    #[arg(
        long = "from",
        short,
        help = "Start of the range, taken as a whole day. Examples are \"yesterday\", \"15/03/2025\", \"last friday\""
    )]
    from_date: Option<String>,
    #[arg(
        long = "to",
        short,
        help = "End of the range, taken as a whole day. Examples are \"yesterday\", \"15/03/2025\", \"last friday\""
    )]
    to_date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(long, default_value_t = SortField::Date, help = "Field to order the table by")]
    sort: SortField,
    #[arg(long, default_value_t = SortDirection::Asc, help = "Direction of ordering")]
    direction: SortDirection,
}

/// In-memory filter and sort applied over the already fetched history. No
/// server round trip happens when only the query changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryQuery {
    pub from: Option<DateTime<Local>>,
    pub to: Option<DateTime<Local>>,
    pub sort: SortField,
    pub direction: SortDirection,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            sort: SortField::Date,
            direction: SortDirection::Asc,
        }
    }
}

impl HistoryQuery {
    /// Drops both date bounds and returns sorting to its defaults.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Filters first, then sorts. Each bound covers the whole day it falls
    /// on: `from` starts at local midnight and `to` ends right before the
    /// next day starts.
    pub fn apply(&self, mut measurements: Vec<MeasurementEntity>) -> Vec<MeasurementEntity> {
        if let Some(from) = self.from {
            let from = from.beginning_of_day().with_timezone(&Utc);
            measurements.retain(|m| m.created_at >= from);
        }
        if let Some(to) = self.to {
            let to = next_day_start(to).with_timezone(&Utc);
            measurements.retain(|m| m.created_at < to);
        }

        measurements.sort_by(|a, b| {
            let ordering = match self.sort {
                SortField::Date => a.created_at.cmp(&b.created_at),
                SortField::Time => a.elapsed_ms.total_cmp(&b.elapsed_ms),
            };
            match self.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });

        measurements
    }
}

/// Command to process `history`. Fetches the full history once and presents
/// it filtered and sorted locally.
pub async fn process_history_command(command: HistoryCommand, client: ApiClient) -> Result<()> {
    let query = parse_values(command)?;

    let measurements = client.list().await.inspect_err(|e| {
        println!("{}", Red.paint(format!("Failed to load measurements: {e}")));
    })?;

    print_history(query.apply(measurements));
    Ok(())
}

fn parse_values(
    HistoryCommand {
        from_date,
        to_date,
        date_style,
        sort,
        direction,
    }: HistoryCommand,
) -> Result<HistoryQuery> {
    let now = Local::now();
    let dialect: chrono_english::Dialect = date_style.into();
    let from = match from_date.map(|s| parse_date_string(&s, now, dialect)) {
        Some(Ok(v)) => Some(v.with_timezone(&Local)),
        Some(Err(e)) => {
            return Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to validate start date {e}"),
                )
                .into());
        }
        None => None,
    };
    let to = match to_date.map(|s| parse_date_string(&s, now, dialect)) {
        Some(Ok(v)) => Some(v.with_timezone(&Local)),
        Some(Err(e)) => {
            return Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to validate end date {e}"),
                )
                .into());
        }
        None => None,
    };

    Ok(HistoryQuery {
        from,
        to,
        sort,
        direction,
    })
}

fn print_history(measurements: Vec<MeasurementEntity>) {
    println!("ID\tDate/Time\tTime (ms)");
    if measurements.is_empty() {
        println!("No records found.");
        return;
    }
    for measurement in measurements {
        println!(
            "{}\t{}\t{} ms",
            measurement.id,
            measurement
                .created_at
                .with_timezone(&Local)
                .format("%x %H:%M:%S"),
            measurement.elapsed_ms
        );
    }
}
