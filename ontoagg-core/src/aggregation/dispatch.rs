//! Service catalogue and per-service dispatch to the statistics engines

use super::carry_over::filter_carry_over;
use super::output::AggregationContext;
use super::{continuous, discrete};
use crate::model::{ContinuousChange, PartitionedRecords, StateChange};
use crate::ontology::Triple;
use crate::{AggregationError, Literal, Result};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Unit datatype of a continuous component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitTag {
    Celsius,
    Lux,
    Percent,
    Hue,
    Saturation,
    Brightness,
    Voltage,
    Watt,
    Ampere,
}

impl UnitTag {
    /// Local name of the datatype in the ontology
    pub fn local_name(&self) -> &'static str {
        match self {
            UnitTag::Celsius => "Celsius",
            UnitTag::Lux => "Lux",
            UnitTag::Percent => "Percent",
            UnitTag::Hue => "Hue",
            UnitTag::Saturation => "Saturation",
            UnitTag::Brightness => "Brightness",
            UnitTag::Voltage => "Voltage",
            UnitTag::Watt => "Watt",
            UnitTag::Ampere => "Ampere",
        }
    }
}

/// How the records of a service are aggregated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Treatment {
    Discrete,
    Continuous(UnitTag),
    /// State resource plus a level (battery)
    DiscreteAndContinuous(UnitTag),
    /// Several literal components reported together
    MultiComponent([UnitTag; 3]),
    /// Known but not aggregated (alarms)
    Unsupported,
}

macro_rules! service_types {
    ($($variant:ident => $name:literal: $treatment:expr,)+) => {
        /// Provider services known to the aggregation
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ServiceType {
            $($variant,)+
        }

        impl ServiceType {
            pub const ALL: &'static [ServiceType] = &[$(ServiceType::$variant,)+];

            /// Local name of the provider service individual
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(ServiceType::$variant => $name,)+
                }
            }

            pub fn treatment(&self) -> Treatment {
                match self {
                    $(ServiceType::$variant => $treatment,)+
                }
            }
        }
    };
}

service_types! {
    Activation => "ACTIVATION_STATE_SERVICE": Treatment::Discrete,
    Button => "BUTTON_STATE_SERVICE": Treatment::Discrete,
    Contact => "CONTACT_STATE_SERVICE": Treatment::Discrete,
    Door => "DOOR_STATE_SERVICE": Treatment::Discrete,
    Handle => "HANDLE_STATE_SERVICE": Treatment::Discrete,
    Motion => "MOTION_STATE_SERVICE": Treatment::Discrete,
    Passage => "PASSAGE_STATE_SERVICE": Treatment::Discrete,
    Power => "POWER_STATE_SERVICE": Treatment::Discrete,
    Presence => "PRESENCE_STATE_SERVICE": Treatment::Discrete,
    Standby => "STANDBY_STATE_SERVICE": Treatment::Discrete,
    Switch => "SWITCH_STATE_SERVICE": Treatment::Discrete,
    Tamper => "TAMPER_STATE_SERVICE": Treatment::Discrete,
    UserTransit => "USER_TRANSIT_STATE_SERVICE": Treatment::Discrete,
    Window => "WINDOW_STATE_SERVICE": Treatment::Discrete,
    Temperature => "TEMPERATURE_STATE_SERVICE": Treatment::Continuous(UnitTag::Celsius),
    TargetTemperature => "TARGET_TEMPERATURE_STATE_SERVICE": Treatment::Continuous(UnitTag::Celsius),
    Illuminance => "ILLUMINANCE_STATE_SERVICE": Treatment::Continuous(UnitTag::Lux),
    Blind => "BLIND_STATE_SERVICE": Treatment::Continuous(UnitTag::Percent),
    Brightness => "BRIGHTNESS_STATE_SERVICE": Treatment::Continuous(UnitTag::Percent),
    Intensity => "INTENSITY_STATE_SERVICE": Treatment::Continuous(UnitTag::Percent),
    Battery => "BATTERY_STATE_SERVICE": Treatment::DiscreteAndContinuous(UnitTag::Percent),
    Color => "COLOR_STATE_SERVICE":
        Treatment::MultiComponent([UnitTag::Hue, UnitTag::Saturation, UnitTag::Brightness]),
    PowerConsumption => "POWER_CONSUMPTION_STATE_SERVICE":
        Treatment::MultiComponent([UnitTag::Voltage, UnitTag::Watt, UnitTag::Ampere]),
    EarthquakeAlarm => "EARTHQUAKE_ALARM_STATE_SERVICE": Treatment::Unsupported,
    FireAlarm => "FIRE_ALARM_STATE_SERVICE": Treatment::Unsupported,
    SmokeAlarm => "SMOKE_ALARM_STATE_SERVICE": Treatment::Unsupported,
    Smoke => "SMOKE_STATE_SERVICE": Treatment::Unsupported,
    TemperatureAlarm => "TEMPERATURE_ALARM_STATE_SERVICE": Treatment::Unsupported,
    WaterAlarm => "WATER_ALARM_STATE_SERVICE": Treatment::Unsupported,
    IntrusionAlarm => "INTRUSION_ALARM_STATE_SERVICE": Treatment::Unsupported,
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = AggregationError;

    fn from_str(s: &str) -> Result<Self> {
        ServiceType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| AggregationError::UnknownServiceType(s.to_string()))
    }
}

/// Aggregate the records of one (unit, service) group into triples.
///
/// `records` must be sorted ascending. Returns `EmptyInput` when nothing in
/// the group contributes to the window.
pub fn identify_service_type(
    ctx: &AggregationContext<'_>,
    service: &str,
    records: Vec<StateChange>,
    unit_connected_ms: i64,
    unit: &str,
) -> Result<Vec<Triple>> {
    let service_type: ServiceType = service.parse()?;
    let treatment = service_type.treatment();
    if treatment == Treatment::Unsupported {
        debug!(unit, service, "service not aggregated");
        return Ok(Vec::new());
    }

    let parts: PartitionedRecords = records.into_iter().collect();
    if parts.has_raw() && parts.has_aggregated() {
        return Err(AggregationError::MixedRecordKinds(service.to_string()));
    }
    let time_weighting = super::time_weighting(unit, unit_connected_ms, ctx.window)?;
    let group = Group {
        ctx,
        unit,
        service,
        time_weighting,
        parts: carry_over(parts, ctx.window.from_millis()),
    };

    match treatment {
        Treatment::Discrete => {
            group.reject_continuous()?;
            group.discrete()
        }
        Treatment::Continuous(tag) => {
            group.reject_discrete()?;
            group.continuous(tag, true)
        }
        Treatment::DiscreteAndContinuous(tag) => {
            combine([group.discrete(), group.continuous(tag, true)])
        }
        Treatment::MultiComponent(tags) => {
            group.reject_discrete()?;
            combine(tags.map(|tag| group.continuous(tag, false)))
        }
        Treatment::Unsupported => Ok(Vec::new()),
    }
}

fn carry_over(mut parts: PartitionedRecords, from: i64) -> PartitionedRecords {
    parts.discrete = filter_carry_over(std::mem::take(&mut parts.discrete), from);
    parts.continuous = filter_carry_over(std::mem::take(&mut parts.continuous), from);
    parts
}

/// Merge component outputs; components without input are skipped unless
/// every one of them is empty
fn combine<const N: usize>(outputs: [Result<Vec<Triple>>; N]) -> Result<Vec<Triple>> {
    let mut triples = Vec::new();
    let mut produced = false;
    for output in outputs {
        match output {
            Ok(t) => {
                produced = true;
                triples.extend(t);
            }
            Err(AggregationError::EmptyInput) => {}
            Err(e) => return Err(e),
        }
    }
    if produced {
        Ok(triples)
    } else {
        Err(AggregationError::EmptyInput)
    }
}

struct Group<'g, 'a> {
    ctx: &'g AggregationContext<'a>,
    unit: &'g str,
    service: &'g str,
    time_weighting: f64,
    parts: PartitionedRecords,
}

impl Group<'_, '_> {
    fn reject_discrete(&self) -> Result<()> {
        if self.parts.discrete.is_empty() && self.parts.aggregated_discrete.is_empty() {
            return Ok(());
        }
        Err(AggregationError::UnexpectedValueKind {
            expected: "literal",
            found: "resource".to_string(),
        })
    }

    fn reject_continuous(&self) -> Result<()> {
        if self.parts.continuous.is_empty() && self.parts.aggregated_continuous.is_empty() {
            return Ok(());
        }
        Err(AggregationError::UnexpectedValueKind {
            expected: "resource",
            found: "literal".to_string(),
        })
    }

    fn discrete(&self) -> Result<Vec<Triple>> {
        let stats = if self.parts.has_aggregated() {
            discrete::aggregate_summaries(&self.parts.aggregated_discrete, self.time_weighting)?
        } else {
            discrete::aggregate_changes(&self.parts.discrete, self.ctx.window, self.time_weighting)?
        };
        Ok(stats
            .iter()
            .flat_map(|s| self.ctx.discrete_triples(self.unit, self.service, s))
            .collect())
    }

    /// `single`: the service reports one value per observation, so a literal
    /// with a generic datatype still counts for the component
    fn continuous(&self, tag: UnitTag, single: bool) -> Result<Vec<Triple>> {
        let datatype = self.ctx.ontology.iri(tag.local_name());
        let stats = if self.parts.has_aggregated() {
            let summaries = self
                .parts
                .aggregated_continuous
                .iter()
                .filter(|s| single || s.value.datatype == datatype);
            continuous::aggregate_summaries(summaries, self.time_weighting)?
        } else {
            let values = self
                .parts
                .continuous
                .iter()
                .filter_map(|c| component(c, &datatype, single));
            continuous::aggregate_values(values, self.time_weighting)?
        };
        Ok(self
            .ctx
            .continuous_triples(self.unit, self.service, &datatype, &stats))
    }
}

fn component<'c>(change: &'c ContinuousChange, datatype: &str, single: bool) -> Option<&'c Literal> {
    change.component(datatype).or_else(|| match change.values.as_slice() {
        [only] if single => Some(only),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::ObservationIdGenerator;
    use crate::model::{ContinuousSummary, DiscreteChange, DiscreteSummary};
    use crate::ontology::{vocab, Ontology};
    use crate::{parse_timestamp, AggregationWindow, ErrorCollection, Period};

    const DAY: i64 = 86_400_000;

    struct Fixture {
        ontology: Ontology,
        window: AggregationWindow,
        ids: ObservationIdGenerator,
    }

    impl Fixture {
        fn new(period: Period) -> Self {
            Self {
                ontology: Ontology::default(),
                window: AggregationWindow::ending_at(
                    period,
                    parse_timestamp("2024-03-11T00:00:00+00:00").unwrap(),
                ),
                ids: ObservationIdGenerator::new(),
            }
        }

        fn ctx(&self) -> AggregationContext<'_> {
            AggregationContext::new(&self.ontology, &self.window, &self.ids)
        }

        fn discrete(&self, ts: &str, value: &str) -> StateChange {
            StateChange::Discrete(DiscreteChange {
                timestamp: parse_timestamp(ts).unwrap(),
                value: self.ontology.iri(value),
            })
        }

        fn continuous(&self, ts: &str, values: &[(&str, &str)]) -> StateChange {
            StateChange::Continuous(ContinuousChange {
                timestamp: parse_timestamp(ts).unwrap(),
                values: values
                    .iter()
                    .map(|(v, tag)| Literal::new(*v, self.ontology.iri(tag)))
                    .collect(),
            })
        }
    }

    fn count_subjects(triples: &[Triple]) -> usize {
        let mut subjects: Vec<&str> = triples.iter().map(|t| t.subject.as_str()).collect();
        subjects.sort_unstable();
        subjects.dedup();
        subjects.len()
    }

    fn objects<'t>(triples: &'t [Triple], ontology: &Ontology, predicate: &str) -> Vec<&'t str> {
        let predicate = ontology.term(predicate);
        triples
            .iter()
            .filter(|t| t.predicate == predicate)
            .map(|t| t.object.as_str())
            .collect()
    }

    #[test]
    fn test_catalogue_round_trip() {
        for service in ServiceType::ALL {
            assert_eq!(service.as_str().parse::<ServiceType>().unwrap(), *service);
        }
        assert_eq!(ServiceType::ALL.len(), 30);
        assert!(matches!(
            "HOUR_STATE_SERVICE".parse::<ServiceType>(),
            Err(AggregationError::UnknownServiceType(_))
        ));
    }

    #[test]
    fn test_unknown_service_fails_only_its_group() {
        let f = Fixture::new(Period::Day);
        let ctx = f.ctx();
        let groups = vec![
            ("POWER_STATE_SERVICE", vec![f.discrete("2024-03-10T08:00:00+00:00", "ON")]),
            ("WINDOW_STATE_SERVICE", vec![f.discrete("2024-03-10T09:00:00+00:00", "OPEN")]),
            (
                "TEMPERATURE_STATE_SERVICE",
                vec![f.continuous("2024-03-10T10:00:00+00:00", &[("21.0", "Celsius")])],
            ),
            ("FLUX_CAPACITOR_STATE_SERVICE", vec![f.discrete("2024-03-10T10:00:00+00:00", "ON")]),
            (
                "ILLUMINANCE_STATE_SERVICE",
                vec![f.continuous("2024-03-10T11:00:00+00:00", &[("300", "Lux")])],
            ),
            ("MOTION_STATE_SERVICE", vec![f.discrete("2024-03-10T12:00:00+00:00", "MOTION")]),
        ];

        let mut errors = ErrorCollection::new();
        let mut services = Vec::new();
        for (service, records) in groups {
            let result = identify_service_type(&ctx, service, records, DAY, "u1");
            if let Some(triples) = errors.collect(result) {
                assert!(!triples.is_empty());
                services.push(service);
            }
        }
        assert_eq!(errors.len(), 1);
        assert_eq!(services.len(), 5);
    }

    #[test]
    fn test_alarm_services_produce_nothing() {
        let f = Fixture::new(Period::Day);
        let records = vec![f.discrete("2024-03-10T08:00:00+00:00", "ALARM")];
        let triples =
            identify_service_type(&f.ctx(), "SMOKE_ALARM_STATE_SERVICE", records, DAY, "u1").unwrap();
        assert!(triples.is_empty());
    }

    #[test]
    fn test_mixed_kinds_rejected() {
        let f = Fixture::new(Period::Day);
        let records = vec![
            f.discrete("2024-03-10T08:00:00+00:00", "ON"),
            StateChange::AggregatedDiscrete(DiscreteSummary {
                window_start: 0,
                time_weighting: 1.0,
                activity_time: 10,
                quantity: 1,
                value: f.ontology.iri("ON"),
            }),
        ];
        let err = identify_service_type(&f.ctx(), "POWER_STATE_SERVICE", records, DAY, "u1")
            .unwrap_err();
        assert!(matches!(err, AggregationError::MixedRecordKinds(_)));
    }

    #[test]
    fn test_connection_time_beyond_window_is_invariant_violation() {
        let f = Fixture::new(Period::Day);
        let records = vec![f.discrete("2024-03-10T08:00:00+00:00", "ON")];
        let err = identify_service_type(&f.ctx(), "POWER_STATE_SERVICE", records, DAY + 1, "u1")
            .unwrap_err();
        assert!(err.is_invariant_violation());
    }

    #[test]
    fn test_carried_value_fills_window() {
        let f = Fixture::new(Period::Day);
        let records = vec![
            f.discrete("2024-03-09T10:00:00+00:00", "OFF"),
            f.discrete("2024-03-09T20:00:00+00:00", "ON"),
            f.discrete("2024-03-10T12:00:00+00:00", "OFF"),
        ];
        let triples =
            identify_service_type(&f.ctx(), "SWITCH_STATE_SERVICE", records, DAY, "u1").unwrap();
        assert_eq!(count_subjects(&triples), 2);
        let total: i64 = objects(&triples, &f.ontology, vocab::HAS_ACTIVITY_TIME)
            .iter()
            .map(|o| o[1..o.find("\"^^").unwrap()].parse::<i64>().unwrap())
            .sum();
        assert_eq!(total, DAY);
    }

    #[test]
    fn test_color_components_aggregate_separately() {
        let f = Fixture::new(Period::Day);
        let records = vec![
            f.continuous(
                "2024-03-10T08:00:00+00:00",
                &[("120", "Hue"), ("50", "Saturation"), ("80", "Brightness")],
            ),
            f.continuous(
                "2024-03-10T09:00:00+00:00",
                &[("140", "Hue"), ("60", "Saturation"), ("90", "Brightness")],
            ),
        ];
        let triples =
            identify_service_type(&f.ctx(), "COLOR_STATE_SERVICE", records, DAY, "lamp").unwrap();
        assert_eq!(count_subjects(&triples), 3);
        let values = objects(&triples, &f.ontology, vocab::HAS_STATE_VALUE);
        let hue = format!("\"130.0\"^^<{}>", f.ontology.iri("Hue"));
        assert!(values.contains(&hue.as_str()));
    }

    #[test]
    fn test_battery_yields_state_and_level() {
        let f = Fixture::new(Period::Day);
        let records = vec![
            f.discrete("2024-03-10T08:00:00+00:00", "OK"),
            f.continuous("2024-03-10T08:00:00+00:00", &[("87", "Percent")]),
        ];
        let triples =
            identify_service_type(&f.ctx(), "BATTERY_STATE_SERVICE", records, DAY, "sensor").unwrap();
        assert_eq!(count_subjects(&triples), 2);
    }

    #[test]
    fn test_literal_for_discrete_service_rejected() {
        let f = Fixture::new(Period::Day);
        let records = vec![f.continuous("2024-03-10T08:00:00+00:00", &[("1", "Percent")])];
        let err = identify_service_type(&f.ctx(), "POWER_STATE_SERVICE", records, DAY, "u1")
            .unwrap_err();
        assert!(err.is_data_error());
    }

    #[test]
    fn test_week_pools_daily_summaries() {
        let f = Fixture::new(Period::Week);
        let day = |start: i64, mean: f64, quantity: u32| {
            StateChange::AggregatedContinuous(ContinuousSummary {
                window_start: start,
                mean,
                variance: 1.0,
                standard_deviation: 1.0,
                time_weighting: 1.0,
                quantity,
                value: Literal::new(mean.to_string(), f.ontology.iri("Celsius")),
            })
        };
        let records = vec![day(0, 20.0, 2), day(DAY, 22.0, 2)];
        let triples = identify_service_type(
            &f.ctx(),
            "TEMPERATURE_STATE_SERVICE",
            records,
            2 * DAY,
            "u1",
        )
        .unwrap();
        let quantity = objects(&triples, &f.ontology, vocab::HAS_QUANTITY);
        assert!(quantity[0].starts_with("\"4\"^^"));
        let variance = objects(&triples, &f.ontology, vocab::HAS_VARIANCE);
        assert!(variance[0].starts_with("\"2.0\"^^"));
    }
}
