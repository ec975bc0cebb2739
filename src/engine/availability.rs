use chrono::{Datelike, NaiveDate, Weekday};
use ulid::Ulid;

use crate::limits::MAX_RANGES_PER_DAY;
use crate::model::*;

use super::{AvailabilityRepository, Engine, EngineError, ReservationRepository};

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Check per-day limits, well-formedness and overlap. Ranges are sorted in place.
pub fn validate_template(template: &mut AvailabilityTemplate) -> Result<(), EngineError> {
    for weekday in WEEK {
        let day = template.day_mut(weekday);
        if day.ranges.len() > MAX_RANGES_PER_DAY {
            return Err(EngineError::Validation(format!(
                "{weekday}: {} ranges, at most {MAX_RANGES_PER_DAY} allowed",
                day.ranges.len()
            )));
        }
        if let Some(bad) = day.ranges.iter().find(|r| !r.is_well_formed()) {
            return Err(EngineError::Validation(format!("{weekday}: range {bad} must start before it ends")));
        }
        day.ranges.sort();
        if let Some(pair) = day.ranges.windows(2).find(|w| w[0].overlaps(&w[1])) {
            return Err(EngineError::Validation(format!(
                "{weekday}: ranges {} and {} overlap",
                pair[0], pair[1]
            )));
        }
    }
    Ok(())
}

/// Merge a sorted list of ranges, joining overlapping and adjacent ones.
fn merge_overlapping(sorted: &[TimeRange]) -> Vec<TimeRange> {
    let mut merged: Vec<TimeRange> = Vec::new();
    for &range in sorted {
        if let Some(last) = merged.last_mut()
            && range.start <= last.end
        {
            last.end = last.end.max(range.end);
            continue;
        }
        merged.push(range);
    }
    merged
}

/// `base` minus `to_remove`. Both inputs must be sorted by start;
/// `to_remove` must not overlap itself.
pub fn subtract_ranges(base: &[TimeRange], to_remove: &[TimeRange]) -> Vec<TimeRange> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(TimeRange::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(TimeRange::new(current_start, current_end));
        }
    }

    result
}

impl Engine {
    pub async fn get_availability(&self, teacher_id: Ulid) -> Result<Option<AvailabilityTemplate>, EngineError> {
        self.store.get_template(teacher_id).await
    }

    /// Replace the instructor's weekly template.
    pub async fn publish_availability(
        &self,
        actor: Actor,
        teacher_id: Ulid,
        mut template: AvailabilityTemplate,
    ) -> Result<AvailabilityTemplate, EngineError> {
        if actor.role != Role::Instructor || actor.user_id != teacher_id {
            return Err(EngineError::Forbidden {
                actor: actor.user_id,
                target: teacher_id,
            });
        }
        validate_template(&mut template)?;
        self.store.put_template(teacher_id, template.clone()).await?;
        tracing::info!(teacher = %teacher_id, "availability published");
        Ok(template)
    }

    /// The instructor's published ranges on `date`, minus slots already paid.
    pub async fn open_ranges(&self, teacher_id: Ulid, date: NaiveDate) -> Result<Vec<TimeRange>, EngineError> {
        let Some(template) = self.store.get_template(teacher_id).await? else {
            return Ok(Vec::new());
        };
        let day = template.day(date.weekday());
        if !day.enabled {
            return Ok(Vec::new());
        }

        let mut paid: Vec<TimeRange> = self
            .store
            .list_for_user(teacher_id)
            .await?
            .into_iter()
            .filter(|r| r.teacher_id == teacher_id && r.date == date && r.status == Status::Paid)
            .map(|r| r.slot)
            .collect();
        paid.sort();
        let paid = merge_overlapping(&paid);

        let mut base = day.ranges.clone();
        base.sort();
        Ok(subtract_ranges(&base, &paid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(a: &str, b: &str) -> TimeRange {
        TimeRange::new(a.parse().unwrap(), b.parse().unwrap())
    }

    #[test]
    fn subtract_middle() {
        let free = subtract_ranges(&[r("09:00", "12:00")], &[r("10:00", "11:00")]);
        assert_eq!(free, vec![r("09:00", "10:00"), r("11:00", "12:00")]);
    }

    #[test]
    fn subtract_spanning_two_bases() {
        let free = subtract_ranges(
            &[r("09:00", "12:00"), r("13:00", "17:00")],
            &[r("11:00", "14:00"), r("16:00", "17:00")],
        );
        assert_eq!(free, vec![r("09:00", "11:00"), r("14:00", "16:00")]);
    }

    #[test]
    fn subtract_nothing_and_everything() {
        let base = [r("09:00", "10:00")];
        assert_eq!(subtract_ranges(&base, &[]), base.to_vec());
        assert!(subtract_ranges(&base, &[r("08:00", "11:00")]).is_empty());
    }

    #[test]
    fn merge_joins_adjacent_and_overlapping() {
        let merged = merge_overlapping(&[r("09:00", "10:00"), r("10:00", "11:00"), r("10:30", "12:00")]);
        assert_eq!(merged, vec![r("09:00", "12:00")]);
    }

    #[test]
    fn template_rejects_too_many_ranges() {
        let mut t = AvailabilityTemplate::default();
        let monday = t.day_mut(Weekday::Mon);
        monday.enabled = true;
        monday.ranges = vec![
            r("08:00", "09:00"),
            r("09:00", "10:00"),
            r("10:00", "11:00"),
            r("11:00", "12:00"),
            r("12:00", "13:00"),
        ];
        assert!(matches!(validate_template(&mut t), Err(EngineError::Validation(_))));

        t.day_mut(Weekday::Mon).ranges.pop();
        assert!(validate_template(&mut t).is_ok());
    }

    #[test]
    fn template_rejects_overlap_and_inverted_ranges() {
        let mut t = AvailabilityTemplate::default();
        t.day_mut(Weekday::Wed).ranges = vec![r("13:00", "15:00"), r("09:00", "13:30")];
        assert!(matches!(validate_template(&mut t), Err(EngineError::Validation(_))));

        let mut t = AvailabilityTemplate::default();
        t.day_mut(Weekday::Fri).ranges = vec![r("15:00", "14:00")];
        assert!(matches!(validate_template(&mut t), Err(EngineError::Validation(_))));
    }

    #[test]
    fn template_ranges_are_sorted() {
        let mut t = AvailabilityTemplate::default();
        t.day_mut(Weekday::Sun).ranges = vec![r("15:00", "16:00"), r("09:00", "10:00")];
        validate_template(&mut t).unwrap();
        assert_eq!(t.day(Weekday::Sun).ranges, vec![r("09:00", "10:00"), r("15:00", "16:00")]);
    }
}
