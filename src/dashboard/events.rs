//! User interaction events and their one-line command form.
//!
//! Commands mirror the dashboard controls:
//!
//! ```text
//! slider 3            month 2021-06
//! district All        school-type Elementary
//! model Virtual       enrollment 0-199
//! click Virtual       click
//! reset
//! ```

use crate::filter::{Filter, FilterParseError, RangeFilter};
use crate::models::{LearningModel, ParseYearMonthError, YearMonth};
use std::str::FromStr;
use thiserror::Error;

/// Errors raised when an event cannot be parsed or applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DashboardError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("command '{command}' needs a value")]
    MissingArgument { command: String },

    #[error("slider index must be a number, got '{0}'")]
    InvalidSliderIndex(String),

    #[error("slider index {index} out of range (0..{len})")]
    SliderOutOfRange { index: usize, len: usize },

    #[error("no data for month {0}")]
    UnknownMonth(YearMonth),

    #[error(transparent)]
    YearMonth(#[from] ParseYearMonthError),

    #[error(transparent)]
    Filter(#[from] FilterParseError),
}

/// One interaction with the dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DashboardEvent {
    /// Move the time slider to an index of the sorted month list.
    Slider(usize),
    /// Select a month directly.
    Month(YearMonth),
    District(Filter<String>),
    SchoolType(Filter<String>),
    LearningModel(Filter<LearningModel>),
    Enrollment(RangeFilter),
    /// Click on a categorical mark.
    ClickMark(LearningModel),
    /// Click on empty page area.
    ClickBackground,
    /// Back to the initial selection.
    Reset,
}

impl DashboardEvent {
    /// Whether the event changes the filter selection (and so the working set).
    pub fn is_filter_change(&self) -> bool {
        !matches!(
            self,
            DashboardEvent::ClickMark(_) | DashboardEvent::ClickBackground
        )
    }
}

impl FromStr for DashboardEvent {
    type Err = DashboardError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (command, arg) = match line.split_once(char::is_whitespace) {
            Some((command, arg)) => (command, arg.trim()),
            None => (line, ""),
        };

        let require = |arg: &str| {
            if arg.is_empty() {
                Err(DashboardError::MissingArgument {
                    command: command.to_string(),
                })
            } else {
                Ok(())
            }
        };

        match command.to_lowercase().as_str() {
            "slider" => {
                require(arg)?;
                arg.parse()
                    .map(DashboardEvent::Slider)
                    .map_err(|_| DashboardError::InvalidSliderIndex(arg.to_string()))
            }
            "month" => {
                require(arg)?;
                Ok(DashboardEvent::Month(arg.parse()?))
            }
            "district" => {
                require(arg)?;
                Ok(DashboardEvent::District(parse_filter(arg)))
            }
            "school-type" | "school_type" => {
                require(arg)?;
                Ok(DashboardEvent::SchoolType(parse_filter(arg)))
            }
            "model" | "learning-model" => {
                require(arg)?;
                Ok(DashboardEvent::LearningModel(parse_filter(arg)))
            }
            "enrollment" => {
                require(arg)?;
                Ok(DashboardEvent::Enrollment(arg.parse()?))
            }
            "click" if arg.is_empty() => Ok(DashboardEvent::ClickBackground),
            "click" => Ok(DashboardEvent::ClickMark(LearningModel::from(arg))),
            "reset" => Ok(DashboardEvent::Reset),
            _ => Err(DashboardError::UnknownCommand(line.to_string())),
        }
    }
}

fn parse_filter<T>(arg: &str) -> Filter<T>
where
    T: FromStr<Err = std::convert::Infallible>,
{
    match arg.parse::<Filter<T>>() {
        Ok(filter) => filter,
        Err(never) => match never {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filter_events() {
        assert_eq!(
            "district Los Angeles Unified".parse::<DashboardEvent>().unwrap(),
            DashboardEvent::District(Filter::Exact("Los Angeles Unified".to_string()))
        );
        assert_eq!(
            "school-type All".parse::<DashboardEvent>().unwrap(),
            DashboardEvent::SchoolType(Filter::Unrestricted)
        );
        assert_eq!(
            "model In-person".parse::<DashboardEvent>().unwrap(),
            DashboardEvent::LearningModel(Filter::Exact(LearningModel::InPerson))
        );
        assert_eq!(
            "enrollment 0-199".parse::<DashboardEvent>().unwrap(),
            DashboardEvent::Enrollment(RangeFilter::Range { min: 0, max: 199 })
        );
    }

    #[test]
    fn test_parse_time_events() {
        assert_eq!(
            "slider 4".parse::<DashboardEvent>().unwrap(),
            DashboardEvent::Slider(4)
        );
        assert_eq!(
            "month 2021-02".parse::<DashboardEvent>().unwrap(),
            DashboardEvent::Month(YearMonth::new(2021, 2).unwrap())
        );
        assert!(matches!(
            "slider x".parse::<DashboardEvent>(),
            Err(DashboardError::InvalidSliderIndex(_))
        ));
        assert!(matches!(
            "month 2021".parse::<DashboardEvent>(),
            Err(DashboardError::YearMonth(_))
        ));
    }

    #[test]
    fn test_parse_click_events() {
        assert_eq!(
            "click Virtual".parse::<DashboardEvent>().unwrap(),
            DashboardEvent::ClickMark(LearningModel::Virtual)
        );
        assert_eq!(
            "click".parse::<DashboardEvent>().unwrap(),
            DashboardEvent::ClickBackground
        );
        assert!(!DashboardEvent::ClickBackground.is_filter_change());
        assert!(DashboardEvent::Reset.is_filter_change());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "zoom 3".parse::<DashboardEvent>(),
            Err(DashboardError::UnknownCommand(_))
        ));
        assert!(matches!(
            "district".parse::<DashboardEvent>(),
            Err(DashboardError::MissingArgument { .. })
        ));
        assert!(matches!(
            "enrollment 10-abc".parse::<DashboardEvent>(),
            Err(DashboardError::Filter(FilterParseError::InvalidRange(_)))
        ));
    }
}
