//! Maps matches onto Spond events.

use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use fixture_sync_core::constants::{PREFIX_EVENT_ID, PREFIX_LAST_UPDATED};
use fixture_sync_core::{Match, MatchId, Team, TimeSource, Triangle};

use crate::config::EventsConfig;
use crate::types::{
    Event, Group, Location, MatchInfo, MatchType, NewEvent, NewRecipients, NewRecipientsGroup,
    SubGroup,
};

/// Builds the Spond representation of one match on one team's calendar.
pub struct EventBuilder {
    time_source: TimeSource,
    config: EventsConfig,
    sync_results: bool,
}

impl EventBuilder {
    pub fn new(time_source: TimeSource, config: EventsConfig, sync_results: bool) -> Self {
        EventBuilder {
            time_source,
            config,
            sync_results,
        }
    }

    pub fn byline(&self) -> &str {
        &self.config.description_byline
    }

    /// Merges the current match state into `base`, keeping every field of
    /// `base` this system does not manage apart from `responses`.
    pub fn update_event(
        &self,
        triangle: &Triangle,
        fixture: &Match,
        team: &Team,
        base: &Event,
        sub_group: &SubGroup,
        location: Option<Location>,
    ) -> Result<Event> {
        let mut extra = base.extra.clone();
        extra.remove("responses");
        Ok(Event {
            id: base.id.clone(),
            name: fixture.title.clone(),
            start: self.start(triangle, fixture, team),
            end: fixture.end.at_sink,
            description: Some(self.description(triangle, fixture)),
            match_info: Some(self.match_info(triangle, fixture, team, sub_group)?),
            location,
            invite_time: self.invite_time(fixture).or(base.invite_time),
            rsvp_date: self.rsvp_date(fixture).or(base.rsvp_date),
            max_accepted: Some(self.config.max_accepted.max(base.accepted_count())),
            extra,
        })
    }

    pub fn create_event(
        &self,
        triangle: &Triangle,
        fixture: &Match,
        team: &Team,
        group: &Group,
        sub_group: &SubGroup,
        location: Option<Location>,
    ) -> Result<NewEvent> {
        let recipients = NewRecipients {
            group: NewRecipientsGroup {
                id: group.id.clone(),
                sub_groups: vec![sub_group.id.clone()],
            },
            guardians: Vec::new(),
            group_members: group.members_of(sub_group),
            profiles: Vec::new(),
        };
        let mut event = NewEvent::new(
            fixture.title.clone(),
            self.match_info(triangle, fixture, team, sub_group)?,
            recipients,
            self.start(triangle, fixture, team),
            fixture.end.at_sink,
        );
        event.description = Some(self.description(triangle, fixture));
        event.location = location;
        event.invite_time = self.invite_time(fixture);
        event.rsvp_date = self.rsvp_date(fixture);
        event.max_accepted = Some(self.config.max_accepted);
        Ok(event)
    }

    /// Whether `new` differs from `old` in anything worth writing.
    ///
    /// The `Last updated` description line, the opponent colour and an invite
    /// time that `old` never had are ignored.
    pub fn is_modified(&self, old: &Event, new: &Event) -> bool {
        let same_location = old.location.as_ref().and_then(Location::address)
            == new.location.as_ref().and_then(Location::address)
            && old.location.as_ref().and_then(Location::feature)
                == new.location.as_ref().and_then(Location::feature);

        let (old_info, new_info) = (old.match_info.as_ref(), new.match_info.as_ref());
        let same_result = old_info.map(|i| i.kind) == new_info.map(|i| i.kind)
            && old_info.and_then(|i| i.scores_final) == new_info.and_then(|i| i.scores_final)
            && old_info.and_then(|i| i.opponent_score) == new_info.and_then(|i| i.opponent_score)
            && old_info.and_then(|i| i.team_score) == new_info.and_then(|i| i.team_score)
            && old_info.and_then(|i| i.team_colour.as_deref())
                == new_info.and_then(|i| i.team_colour.as_deref());

        let same_invite_time = old.invite_time.is_none() || old.invite_time == new.invite_time;

        let same = old.start == new.start
            && old.end == new.end
            && stable_lines(old.description.as_deref()) == stable_lines(new.description.as_deref())
            && same_location
            && same_result
            && old.max_accepted == new.max_accepted
            && same_invite_time
            && old.rsvp_date == new.rsvp_date;
        !same
    }

    /// Whether `new` carries a score that `old` does not, when results are synced.
    pub fn are_results_modified(&self, old: &Event, new: &Event) -> bool {
        let Some(new_info) = new.match_info.as_ref() else {
            return false;
        };
        let old_info = old.match_info.as_ref();
        self.sync_results
            && new_info.team_score.is_some()
            && (old_info.and_then(|i| i.team_score) != new_info.team_score
                || old_info.and_then(|i| i.opponent_score) != new_info.opponent_score)
    }

    /// Whether `event` was created by this system.
    pub fn is_managed(&self, event: &Event) -> bool {
        event.match_info.is_some()
            && event
                .description
                .as_deref()
                .is_some_and(|d| d.contains(self.byline()))
    }

    /// The source match id recorded in the description of `event`.
    pub fn extract_match_id(&self, event: &Event) -> Option<MatchId> {
        event
            .description
            .as_deref()?
            .lines()
            .find_map(|line| line.strip_prefix(PREFIX_EVENT_ID))
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(MatchId::new)
    }

    pub fn description(&self, triangle: &Triangle, fixture: &Match) -> String {
        let mut lines = vec![
            format!(
                "{}: {} vs {}",
                fixture.id, fixture.team_a.name, fixture.team_b.name
            ),
            String::new(),
            format!("Triangle ID: {}", fixture.triangle),
            format!("Host: {}", triangle.host.name),
            format!("Source: {}", fixture.source),
        ];
        if let Some(result) = &fixture.result {
            lines.push(String::new());
            lines.push(format!(
                "SETS ({}-{}):",
                result.team_a.sets, result.team_b.sets
            ));
            for set in 0..result.sets as usize {
                let score = |scores: &Option<Vec<u32>>| {
                    scores
                        .as_ref()
                        .and_then(|s| s.get(set))
                        .map_or_else(|| "--".to_string(), u32::to_string)
                };
                lines.push(format!(
                    "  {}) {:>2}:{:>2}",
                    set + 1,
                    score(&result.team_a.scores),
                    score(&result.team_b.scores)
                ));
            }
        }
        lines.push(String::new());
        lines.push(format!("{}{}", PREFIX_EVENT_ID, fixture.id));
        lines.push(format!("{}{}", PREFIX_LAST_UPDATED, fixture.last_updated));
        lines.push(self.config.description_byline.clone());

        let mut description = lines.join("\n");
        description.push('\n');
        description
    }

    /// Match start in the sink domain, nudged by a second so a team's
    /// matches never share an instant.
    fn start(&self, triangle: &Triangle, fixture: &Match, team: &Team) -> DateTime<Utc> {
        let home = triangle.is_host(team);
        let nudge = (home && fixture.order == 3) || (!home && fixture.order != 1);
        if nudge {
            (fixture.start + TimeDelta::seconds(1)).at_sink
        } else {
            fixture.start.at_sink
        }
    }

    fn invite_time(&self, fixture: &Match) -> Option<DateTime<Utc>> {
        self.noon_before(fixture, self.config.invitation_days_before_start)
    }

    fn rsvp_date(&self, fixture: &Match) -> Option<DateTime<Utc>> {
        self.noon_before(fixture, self.config.rsvp_deadline_days_before_start)
    }

    /// Noon UTC `days` before the match, unless that is already in the past.
    fn noon_before(&self, fixture: &Match, days: u32) -> Option<DateTime<Utc>> {
        let day = (fixture.start - TimeDelta::days(days.into())).at_sink.date_naive();
        let noon = day.and_time(NaiveTime::from_hms_opt(12, 0, 0)?).and_utc();
        (noon > self.time_source.now().at_sink).then_some(noon)
    }

    fn match_info(
        &self,
        triangle: &Triangle,
        fixture: &Match,
        team: &Team,
        sub_group: &SubGroup,
    ) -> Result<MatchInfo> {
        let opponent = fixture.opponent_of(team).ok_or_else(|| {
            anyhow!(
                "[{}] Neither team A {} nor team B {} match {}",
                fixture.id,
                fixture.team_a,
                fixture.team_b,
                team
            )
        })?;
        let mut info = MatchInfo {
            team_name: sub_group.name.clone(),
            opponent_name: opponent.name.clone(),
            kind: if triangle.is_host(team) {
                MatchType::Home
            } else {
                MatchType::Away
            },
            team_colour: sub_group.color.clone(),
            opponent_colour: Some(self.config.opponent_colour_hex.clone()),
            scores_final: None,
            scores_public: None,
            scores_set: None,
            scores_set_ever: None,
            team_score: None,
            opponent_score: None,
        };
        if let Some((ours, theirs)) = fixture.result_for(team) {
            info.scores_set = Some(true);
            info.scores_set_ever = Some(true);
            info.scores_public = Some(true);
            info.scores_final = Some(true);
            info.team_score = Some(ours.sets);
            info.opponent_score = Some(theirs.sets);
        }
        Ok(info)
    }
}

/// Description lines that identify the content, without the update stamp.
fn stable_lines(description: Option<&str>) -> Option<Vec<&str>> {
    description.map(|d| {
        d.lines()
            .filter(|line| !line.starts_with(PREFIX_LAST_UPDATED))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Member;
    use fixture_sync_core::testing::{result, triangle_matches};
    use fixture_sync_core::{MatchResult, TeamResult, TriangleBuilder};
    use serde_json::json;

    fn builder() -> EventBuilder {
        EventBuilder::new(TimeSource::default(), EventsConfig::default(), true)
    }

    fn sub_group() -> SubGroup {
        SubGroup {
            id: "S1".into(),
            name: "Men 1".into(),
            color: Some("#123456".into()),
        }
    }

    fn triangle_at(start: DateTime<Utc>) -> Triangle {
        let time = TimeSource::default().from_source(start);
        let mut matches = triangle_matches("T001", "A", "B", "C");
        for fixture in &mut matches {
            fixture.start = time;
            fixture.end = time + TimeDelta::hours(4);
        }
        TriangleBuilder::default()
            .build(&matches[0].triangle.clone(), &matches)
            .unwrap()
    }

    fn future_triangle() -> Triangle {
        let start = (Utc::now() + TimeDelta::days(30))
            .date_naive()
            .and_hms_opt(10, 0, 0)
            .unwrap()
            .and_utc();
        triangle_at(start)
    }

    fn past_triangle() -> Triangle {
        triangle_at("2024-09-14T10:00:00Z".parse().unwrap())
    }

    fn base_event(id: &str) -> Event {
        serde_json::from_value(json!({
            "id": id,
            "heading": "old",
            "startTimestamp": "2024-01-01T00:00:00Z",
            "endTimestamp": "2024-01-01T01:00:00Z",
            "responses": {"acceptedIds": ["m1", "m2", "m3"]},
            "creatorId": "c1"
        }))
        .unwrap()
    }

    fn build(triangle: &Triangle, index: usize, team: &str) -> Event {
        let fixture = &triangle.matches[index];
        let team = Team::new(team, team);
        builder()
            .update_event(triangle, fixture, &team, &base_event("E1"), &sub_group(), None)
            .unwrap()
    }

    #[test]
    fn test_description_with_partial_scores() {
        let mut triangle = past_triangle();
        triangle.matches[0].result = Some(MatchResult {
            sets: 3,
            team_a: TeamResult {
                sets: 2,
                scores: Some(vec![25, 9, 25]),
            },
            team_b: TeamResult {
                sets: 1,
                scores: Some(vec![20, 25]),
            },
        });

        let description = builder().description(&triangle, &triangle.matches[0]);

        assert_eq!(
            description,
            "T001a: A vs B\n\
             \n\
             Triangle ID: T001\n\
             Host: A\n\
             Source: Test builder\n\
             \n\
             SETS (2-1):\n\
             \x20 1) 25:20\n\
             \x20 2)  9:25\n\
             \x20 3) 25:--\n\
             \n\
             Event ID: T001a\n\
             Last updated: 2024-09-07T10:00:00Z\n\
             Managed event.\n"
        );
    }

    #[test]
    fn test_description_without_result() {
        let triangle = past_triangle();
        let description = builder().description(&triangle, &triangle.matches[1]);

        assert!(description.starts_with("T001b: B vs C\n\nTriangle ID: T001\nHost: A\n"));
        assert!(!description.contains("SETS"));
        assert!(description.ends_with("\nEvent ID: T001b\nLast updated: 2024-09-07T10:00:00Z\nManaged event.\n"));
    }

    #[test]
    fn test_start_is_staggered_per_team() {
        let triangle = past_triangle();
        let start = triangle.matches[0].start.at_sink;
        let second = TimeDelta::seconds(1);

        // A hosts: its matches are order 1 and 3.
        assert_eq!(build(&triangle, 0, "A").start, start);
        assert_eq!(build(&triangle, 2, "A").start, start + second);
        // B is away in order 1 and 2.
        assert_eq!(build(&triangle, 0, "B").start, start);
        assert_eq!(build(&triangle, 1, "B").start, start + second);
        assert_eq!(build(&triangle, 2, "C").start, start + second);
    }

    #[test]
    fn test_invite_and_rsvp_at_noon_before_future_match() {
        let triangle = future_triangle();
        let event = build(&triangle, 0, "A");
        let day = triangle.matches[0].start.at_sink.date_naive();

        let noon = |days: i64| (day - TimeDelta::days(days)).and_hms_opt(12, 0, 0).unwrap().and_utc();
        assert_eq!(event.invite_time, Some(noon(6)));
        assert_eq!(event.rsvp_date, Some(noon(2)));
    }

    #[test]
    fn test_past_invite_keeps_base_value() {
        let triangle = past_triangle();
        let mut base = base_event("E1");
        let earlier: DateTime<Utc> = "2024-09-08T12:00:00Z".parse().unwrap();
        base.invite_time = Some(earlier);
        let team = Team::new("A", "A");

        let event = builder()
            .update_event(&triangle, &triangle.matches[0], &team, &base, &sub_group(), None)
            .unwrap();

        assert_eq!(event.invite_time, Some(earlier));
        assert_eq!(event.rsvp_date, None);
    }

    #[test]
    fn test_update_preserves_remote_fields_except_responses() {
        let event = build(&past_triangle(), 0, "A");

        assert_eq!(event.id, "E1");
        assert_eq!(event.name, "A vs B");
        assert_eq!(event.extra.get("creatorId"), Some(&json!("c1")));
        assert!(event.extra.get("responses").is_none());
        // Three accepted members never lower the default cap of ten.
        assert_eq!(event.max_accepted, Some(10));
    }

    #[test]
    fn test_max_accepted_follows_accepted_count() {
        let triangle = past_triangle();
        let mut base = base_event("E1");
        let accepted: Vec<String> = (0..14).map(|i| format!("m{i}")).collect();
        base.extra.insert("responses".into(), json!({ "acceptedIds": accepted }));
        let team = Team::new("A", "A");

        let event = builder()
            .update_event(&triangle, &triangle.matches[0], &team, &base, &sub_group(), None)
            .unwrap();

        assert_eq!(event.max_accepted, Some(14));
    }

    #[test]
    fn test_match_info_from_each_side() {
        let mut triangle = past_triangle();
        triangle.matches[0].result = Some(result(&[25, 25], &[20, 18]));

        let home = build(&triangle, 0, "A").match_info.unwrap();
        let away = build(&triangle, 0, "B").match_info.unwrap();

        assert_eq!(home.kind, MatchType::Home);
        assert_eq!(home.team_name, "Men 1");
        assert_eq!(home.opponent_name, "B");
        assert_eq!(home.team_colour.as_deref(), Some("#123456"));
        assert_eq!(home.opponent_colour.as_deref(), Some("#FFFFFF"));
        assert_eq!((home.team_score, home.opponent_score), (Some(2), Some(0)));
        assert_eq!(home.scores_final, Some(true));

        assert_eq!(away.kind, MatchType::Away);
        assert_eq!(away.opponent_name, "A");
        assert_eq!((away.team_score, away.opponent_score), (Some(0), Some(2)));
    }

    #[test]
    fn test_rejects_team_not_in_match() {
        let triangle = past_triangle();
        let outsider = Team::new("C", "C");

        let result = builder().update_event(
            &triangle,
            &triangle.matches[0],
            &outsider,
            &base_event("E1"),
            &sub_group(),
            None,
        );

        assert!(result.is_err());
    }

    #[test]
    fn test_rebuilt_event_is_not_modified() {
        let triangle = future_triangle();
        let first = build(&triangle, 0, "A");
        let team = Team::new("A", "A");
        let second = builder()
            .update_event(&triangle, &triangle.matches[0], &team, &first, &sub_group(), None)
            .unwrap();

        assert!(!builder().is_modified(&first, &second));
        assert!(!builder().are_results_modified(&first, &second));
    }

    #[test]
    fn test_modification_ignores_update_stamp_and_new_invite() {
        let old = build(&past_triangle(), 0, "A");

        let mut stamped = old.clone();
        stamped.description = old
            .description
            .as_ref()
            .map(|d| d.replace("2024-09-07T10:00:00Z", "2024-09-08T11:00:00Z"));
        assert!(!builder().is_modified(&old, &stamped));

        let mut invited = old.clone();
        invited.invite_time = Some("2024-09-08T12:00:00Z".parse().unwrap());
        assert!(!builder().is_modified(&old, &invited));

        let mut moved = old.clone();
        moved.start += TimeDelta::minutes(30);
        assert!(builder().is_modified(&old, &moved));

        let mut renamed = old.clone();
        renamed.description = old.description.as_ref().map(|d| d.replace("Host: A", "Host: B"));
        assert!(builder().is_modified(&old, &renamed));
    }

    #[test]
    fn test_results_modified_only_when_synced_and_scored() {
        let plain = build(&past_triangle(), 0, "A");
        let mut scored_triangle = past_triangle();
        scored_triangle.matches[0].result = Some(result(&[25, 25], &[20, 18]));
        let scored = build(&scored_triangle, 0, "A");

        assert!(builder().are_results_modified(&plain, &scored));
        assert!(!builder().are_results_modified(&scored, &scored));
        assert!(!builder().are_results_modified(&scored, &plain));

        let unsynced = EventBuilder::new(TimeSource::default(), EventsConfig::default(), false);
        assert!(!unsynced.are_results_modified(&plain, &scored));
    }

    #[test]
    fn test_extracts_match_id_and_recognises_managed_events() {
        let event = build(&past_triangle(), 1, "B");

        assert_eq!(builder().extract_match_id(&event), Some(MatchId::new("T001b")));
        assert!(builder().is_managed(&event));

        let mut foreign = base_event("E2");
        foreign.description = Some("Training".into());
        assert_eq!(builder().extract_match_id(&foreign), None);
        assert!(!builder().is_managed(&foreign));
    }

    #[test]
    fn test_create_event_targets_sub_group_members() {
        let triangle = future_triangle();
        let group = Group {
            id: "G1".into(),
            name: "My Club".into(),
            sub_groups: vec![sub_group()],
            members: vec![
                Member {
                    id: "M1".into(),
                    sub_groups: vec!["S1".into()],
                },
                Member {
                    id: "M2".into(),
                    sub_groups: vec!["S2".into()],
                },
            ],
        };
        let team = Team::new("A", "A");

        let event = builder()
            .create_event(&triangle, &triangle.matches[0], &team, &group, &sub_group(), None)
            .unwrap();

        assert_eq!(event.recipients.group.id, "G1");
        assert_eq!(event.recipients.group.sub_groups, vec!["S1"]);
        assert_eq!(event.recipients.group_members, vec!["M1"]);
        assert_eq!(event.max_accepted, Some(10));
        assert!(event.invite_time.is_some());
        assert!(event.description.as_deref().unwrap().contains("Event ID: T001a"));
    }
}
