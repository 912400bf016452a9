//! Due checks for care schedules.
//!
//! A schedule recurs on `schedule_date + k * interval` for `k >= 0`, compared at day
//! precision. Monthly recurrences keep the day of month, clamped to the month's end.

use crate::models::{CareSchedule, CareTask, Interval};
use crate::resource::CareSchedules;
use crate::view::ResourceView;
use chrono::{Datelike, Local, Months, NaiveDate};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

fn months_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to.year() as i64 * 12 + to.month0() as i64) - (from.year() as i64 * 12 + from.month0() as i64)
}

fn add_months(date: NaiveDate, months: i64) -> Option<NaiveDate> {
    u32::try_from(months)
        .ok()
        .and_then(|months| date.checked_add_months(Months::new(months)))
}

/// Whether `today` is one of the schedule's occurrences.
///
/// Due means "an occurrence falls exactly on `today`", not "inside the current week or
/// month": a WEEKLY schedule started on a Wednesday is due on Wednesdays only.
pub fn is_due(schedule_date: NaiveDate, interval: &Interval, today: NaiveDate) -> bool {
    if today < schedule_date {
        return false;
    }
    let days = (today - schedule_date).num_days();

    match interval {
        Interval::Daily => true,
        Interval::Weekly => days % 7 == 0,
        Interval::Fortnightly => days % 14 == 0,
        Interval::Monthly => {
            add_months(schedule_date, months_between(schedule_date, today)) == Some(today)
        }
        Interval::Other(_) => false,
    }
}

/// First occurrence on or after `from`. `None` for intervals that never recur.
pub fn next_occurrence(
    schedule_date: NaiveDate,
    interval: &Interval,
    from: NaiveDate,
) -> Option<NaiveDate> {
    if from <= schedule_date {
        return interval.is_recognized().then_some(schedule_date);
    }
    let days = (from - schedule_date).num_days();

    let step_days = |step: i64| {
        let steps = (days + step - 1) / step;
        schedule_date.checked_add_days(chrono::Days::new((steps * step) as u64))
    };

    match interval {
        Interval::Daily => Some(from),
        Interval::Weekly => step_days(7),
        Interval::Fortnightly => step_days(14),
        Interval::Monthly => {
            let months = months_between(schedule_date, from);
            let candidate = add_months(schedule_date, months)?;
            if candidate >= from {
                Some(candidate)
            } else {
                add_months(schedule_date, months + 1)
            }
        }
        Interval::Other(_) => None,
    }
}

impl CareSchedule {
    pub fn is_due_on(&self, today: NaiveDate) -> bool {
        is_due(self.schedule_date, &self.interval, today)
    }

    pub fn next_occurrence(&self, from: NaiveDate) -> Option<NaiveDate> {
        next_occurrence(self.schedule_date, &self.interval, from)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueNotice {
    pub schedule_id: i64,
    pub plant_id: i64,
    pub plant_name: Option<String>,
    pub task: CareTask,
    pub occurrence: NaiveDate,
}

impl DueNotice {
    pub fn message(&self) -> String {
        match &self.plant_name {
            Some(name) => format!("{} is due for {}", self.task, name),
            None => format!("{} is due for plant #{}", self.task, self.plant_id),
        }
    }
}

/// How often one occurrence may be announced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RepeatPolicy {
    /// Every tick that finds the schedule due announces it again.
    #[default]
    EveryTick,
    /// Each schedule is announced at most once per occurrence date.
    OncePerOccurrence,
}

/// Where the notifier reads schedules from on each tick.
pub trait ScheduleSource: Send + Sync + 'static {
    fn schedules(&self) -> Vec<CareSchedule>;

    /// The notifier stops once this turns false.
    fn is_active(&self) -> bool;
}

impl ScheduleSource for ResourceView<CareSchedules> {
    fn schedules(&self) -> Vec<CareSchedule> {
        self.items()
    }

    fn is_active(&self) -> bool {
        self.is_mounted()
    }
}

impl ScheduleSource for Vec<ResourceView<CareSchedules>> {
    fn schedules(&self) -> Vec<CareSchedule> {
        self.iter()
            .filter(|view| view.is_mounted())
            .flat_map(|view| view.items())
            .collect()
    }

    fn is_active(&self) -> bool {
        self.iter().any(|view| view.is_mounted())
    }
}

/// Read-only periodic scan of loaded schedules; never mutates the list.
#[derive(Debug, Clone)]
pub struct DueNotifier {
    period: Duration,
    policy: RepeatPolicy,
    last_notified: HashMap<i64, NaiveDate>,
}

impl DueNotifier {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            policy: RepeatPolicy::default(),
            last_notified: HashMap::new(),
        }
    }

    pub fn with_policy(mut self, policy: RepeatPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn policy(&self) -> RepeatPolicy {
        self.policy
    }

    /// One tick: a notice for every schedule due `today`, subject to the repeat policy.
    pub fn evaluate(&mut self, schedules: &[CareSchedule], today: NaiveDate) -> Vec<DueNotice> {
        self.last_notified
            .retain(|id, _| schedules.iter().any(|schedule| schedule.id == *id));

        let mut notices = Vec::new();
        for schedule in schedules.iter().filter(|s| s.is_due_on(today)) {
            if self.policy == RepeatPolicy::OncePerOccurrence
                && self.last_notified.get(&schedule.id) == Some(&today)
            {
                continue;
            }
            self.last_notified.insert(schedule.id, today);
            notices.push(DueNotice {
                schedule_id: schedule.id,
                plant_id: schedule.plant_id,
                plant_name: schedule.plant_name.clone(),
                task: schedule.task.clone(),
                occurrence: today,
            });
        }
        notices
    }

    /// Ticks every period (the first one period after start) until the source goes
    /// inactive or the receiver is dropped.
    pub async fn run<S, C>(mut self, source: S, today: C, tx: mpsc::Sender<DueNotice>)
    where
        S: ScheduleSource,
        C: Fn() -> NaiveDate + Send + 'static,
    {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if !source.is_active() {
                tracing::debug!("Schedule source inactive, stopping due notifier");
                return;
            }

            let notices = self.evaluate(&source.schedules(), today());
            for notice in notices {
                tracing::info!("{}", notice.message());
                if tx.send(notice).await.is_err() {
                    tracing::debug!("Due notice receiver dropped, stopping due notifier");
                    return;
                }
            }
        }
    }

    /// Runs on the tokio runtime against the local calendar date.
    pub fn spawn<S: ScheduleSource>(self, source: S, tx: mpsc::Sender<DueNotice>) -> JoinHandle<()> {
        tokio::spawn(self.run(source, || Local::now().date_naive(), tx))
    }
}
