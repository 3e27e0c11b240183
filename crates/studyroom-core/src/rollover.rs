//! Daily rollover: clear completed checklist items at local midnight.
//!
//! A rollover task sleeps until the next local midnight, runs the target's
//! clear operation for the day that just ended, refreshes, and re-arms for the
//! following midnight. It runs until its [`RolloverHandle`] is cancelled or
//! dropped. Midnights that pass while no task is running are not made up.
//!
//! A failed clear is logged and reported as [`Event::RolloverFailed`]; the
//! task then waits for the next midnight without retrying.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::Result;
use crate::events::Event;

/// How far past a skipped local midnight (DST gap) to look for a valid time.
const GAP_SEARCH_MINUTES: i64 = 3 * 60;

/// Start of the next calendar day in `now`'s time zone.
///
/// An ambiguous midnight resolves to its earliest instant; a midnight that
/// does not exist resolves to the first valid minute after it. A calendar day
/// skipped outright moves on to the following day's midnight.
pub fn next_local_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut day = now.date_naive();
    for _ in 0..2 {
        let Some(next) = day.succ_opt() else {
            break;
        };
        day = next;
        let midnight = day.and_time(NaiveTime::MIN);
        let found = match tz.from_local_datetime(&midnight) {
            LocalResult::Single(t) => Some(t),
            LocalResult::Ambiguous(earliest, _) => Some(earliest),
            LocalResult::None => (1..=GAP_SEARCH_MINUTES).find_map(|m| {
                tz.from_local_datetime(&(midnight + chrono::Duration::minutes(m)))
                    .earliest()
            }),
        };
        if let Some(t) = found {
            return t;
        }
    }
    // End of the representable calendar.
    now.clone()
        .checked_add_signed(chrono::Duration::days(1))
        .unwrap_or_else(|| now.clone())
}

/// Time left until [`next_local_midnight`].
pub fn delay_until_next_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> Duration {
    (next_local_midnight(now) - now.clone())
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// The operation a rollover performs.
pub trait RolloverTarget: Send + Sync + 'static {
    /// Clear completed items of `user_id` dated `day`. Must be idempotent.
    fn rollover(&self, user_id: &str, day: NaiveDate) -> impl Future<Output = Result<usize>> + Send;

    /// Reload whatever view depends on the cleared items.
    fn refresh(&self, _user_id: &str) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// Running rollover task for one user. Dropping it cancels the task.
#[derive(Debug)]
pub struct RolloverHandle {
    user_id: String,
    task: JoinHandle<()>,
}

impl RolloverHandle {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn cancel(self) {
        // Drop aborts.
    }
}

impl Drop for RolloverHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawn the self-rearming rollover task for `user_id`.
pub fn spawn_rollover<T, C>(
    target: Arc<T>,
    clock: Arc<C>,
    user_id: String,
    events: broadcast::Sender<Event>,
) -> RolloverHandle
where
    T: RolloverTarget,
    C: Clock,
{
    let task = tokio::spawn(run_rollover(target, clock, user_id.clone(), events));
    RolloverHandle { user_id, task }
}

async fn run_rollover<T, C>(
    target: Arc<T>,
    clock: Arc<C>,
    user_id: String,
    events: broadcast::Sender<Event>,
) where
    T: RolloverTarget,
    C: Clock,
{
    loop {
        let (day, delay) = {
            let now = clock.now();
            (now.date_naive(), delay_until_next_midnight(&now))
        };
        debug!(user_id = %user_id, %day, ?delay, "rollover armed");
        tokio::time::sleep(delay).await;

        let event = match target.rollover(&user_id, day).await {
            Ok(cleared) => {
                info!(user_id = %user_id, %day, cleared, "daily rollover done");
                target.refresh(&user_id).await;
                Event::RolloverCompleted {
                    user_id: user_id.clone(),
                    day,
                    cleared,
                    at: Utc::now(),
                }
            }
            Err(e) => {
                warn!(user_id = %user_id, %day, error = %e, "daily rollover failed, waiting for next midnight");
                Event::RolloverFailed {
                    user_id: user_id.clone(),
                    day,
                    message: e.to_string(),
                    at: Utc::now(),
                }
            }
        };
        let _ = events.send(event);
    }
}

/// Keeps at most one rollover task alive, bound to the current identity.
pub struct DailyRolloverScheduler<T, C> {
    target: Arc<T>,
    clock: Arc<C>,
    events: broadcast::Sender<Event>,
    active: Option<RolloverHandle>,
}

impl<T: RolloverTarget, C: Clock> DailyRolloverScheduler<T, C> {
    pub fn new(target: Arc<T>, clock: C) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            target,
            clock: Arc::new(clock),
            events,
            active: None,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.active.as_ref().map(RolloverHandle::user_id)
    }

    pub fn is_active(&self) -> bool {
        self.active.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Switch to `user_id`, cancelling any pending rollover of the previous
    /// identity first. `None` or an empty id leaves the scheduler inactive.
    ///
    /// Setting the identity that is already active keeps its schedule.
    pub fn set_identity(&mut self, user_id: Option<&str>) {
        let user_id = user_id.map(str::trim).filter(|id| !id.is_empty());
        if user_id.is_some() && user_id == self.user_id() {
            return;
        }
        self.teardown();
        if let Some(id) = user_id {
            info!(user_id = id, "daily rollover scheduled");
            self.active = Some(spawn_rollover(
                self.target.clone(),
                self.clock.clone(),
                id.to_string(),
                self.events.clone(),
            ));
        }
    }

    /// Cancel the pending rollover, if any.
    pub fn teardown(&mut self) {
        if let Some(handle) = self.active.take() {
            debug!(user_id = handle.user_id(), "daily rollover cancelled");
            handle.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::AnchoredClock;
    use crate::error::{CoreError, StoreError};
    use chrono::FixedOffset;
    use chrono_tz::America::Havana;
    use chrono_tz::Pacific::Apia;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(y, mo, d, h, mi, s)
            .unwrap()
    }

    #[derive(Default)]
    struct RecordingTarget {
        calls: Mutex<Vec<(String, NaiveDate)>>,
        refreshes: AtomicUsize,
        fail: AtomicBool,
    }

    impl RecordingTarget {
        fn calls(&self) -> Vec<(String, NaiveDate)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl RolloverTarget for RecordingTarget {
        fn rollover(&self, user_id: &str, day: NaiveDate) -> impl Future<Output = Result<usize>> + Send {
            self.calls.lock().unwrap().push((user_id.to_string(), day));
            let result = if self.fail.load(Ordering::SeqCst) {
                Err(CoreError::Store(StoreError::Unavailable("offline".into())))
            } else {
                Ok(3)
            };
            std::future::ready(result)
        }

        fn refresh(&self, _user_id: &str) -> impl Future<Output = ()> + Send {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    fn scheduler(
        anchor: DateTime<FixedOffset>,
    ) -> (Arc<RecordingTarget>, DailyRolloverScheduler<RecordingTarget, AnchoredClock>) {
        let target = Arc::new(RecordingTarget::default());
        let scheduler = DailyRolloverScheduler::new(target.clone(), AnchoredClock::new(anchor));
        (target, scheduler)
    }

    #[test]
    fn delay_two_seconds_before_midnight() {
        let now = at(2024, 3, 14, 23, 59, 58);
        assert_eq!(delay_until_next_midnight(&now), Duration::from_millis(2_000));
        assert_eq!(next_local_midnight(&now), at(2024, 3, 15, 0, 0, 0));
    }

    #[test]
    fn delay_from_midnight_is_a_full_day() {
        let now = at(2024, 3, 15, 0, 0, 0);
        assert_eq!(delay_until_next_midnight(&now), Duration::from_millis(86_400_000));
    }

    #[test]
    fn midnight_crosses_month_and_year() {
        assert_eq!(
            next_local_midnight(&at(2024, 2, 29, 13, 0, 0)),
            at(2024, 3, 1, 0, 0, 0)
        );
        assert_eq!(
            next_local_midnight(&at(2023, 12, 31, 23, 0, 0)),
            at(2024, 1, 1, 0, 0, 0)
        );
    }

    #[test]
    fn ambiguous_midnight_takes_earliest_instant() {
        // Havana falls back from 01:00 CDT to 00:00 CST on 2024-11-03.
        let now = Havana.with_ymd_and_hms(2024, 11, 2, 20, 0, 0).unwrap();
        let next = next_local_midnight(&now);
        assert_eq!(
            next.naive_local(),
            NaiveDate::from_ymd_opt(2024, 11, 3).unwrap().and_time(NaiveTime::MIN)
        );
        assert_eq!(next.with_timezone(&Utc), Utc.with_ymd_and_hms(2024, 11, 3, 4, 0, 0).unwrap());
        assert_eq!(delay_until_next_midnight(&now), Duration::from_secs(4 * 3600));
    }

    #[test]
    fn skipped_midnight_falls_forward_to_first_valid_minute() {
        // Havana springs forward from 00:00 CST to 01:00 CDT on 2024-03-10.
        let now = Havana.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        let next = next_local_midnight(&now);
        assert_eq!(
            next.naive_local(),
            NaiveDate::from_ymd_opt(2024, 3, 10).unwrap().and_hms_opt(1, 0, 0).unwrap()
        );
        assert_eq!(next.with_timezone(&Utc), Utc.with_ymd_and_hms(2024, 3, 10, 5, 0, 0).unwrap());
        assert_eq!(delay_until_next_midnight(&now), Duration::from_secs(12 * 3600));
    }

    #[test]
    fn skipped_calendar_day_moves_to_following_midnight() {
        // Samoa skipped 2011-12-30 when it crossed the date line.
        let now = Apia.with_ymd_and_hms(2011, 12, 29, 12, 0, 0).unwrap();
        let next = next_local_midnight(&now);
        assert_eq!(
            next.naive_local(),
            NaiveDate::from_ymd_opt(2011, 12, 31).unwrap().and_time(NaiveTime::MIN)
        );
        assert!(next > now);
    }

    #[test]
    fn end_of_calendar_does_not_overflow() {
        let last = NaiveDate::MAX.and_hms_opt(12, 0, 0).unwrap();
        let now = Utc.from_utc_datetime(&last);
        assert_eq!(next_local_midnight(&now), now);
        assert_eq!(delay_until_next_midnight(&now), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn fires_at_midnight_then_rearms_for_next_day() {
        let (target, mut scheduler) = scheduler(at(2024, 3, 14, 23, 59, 58));
        scheduler.set_identity(Some("u1"));
        assert!(scheduler.is_active());

        tokio::time::sleep(Duration::from_millis(1_900)).await;
        assert!(target.calls().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        let day = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap();
        assert_eq!(target.calls(), vec![("u1".to_string(), day)]);
        assert_eq!(target.refreshes.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(86_400 - 1)).await;
        assert_eq!(target.calls().len(), 1);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(
            target.calls()[1],
            ("u1".to_string(), NaiveDate::from_ymd_opt(2024, 3, 15).unwrap())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_before_midnight_prevents_clear() {
        let (target, mut scheduler) = scheduler(at(2024, 3, 14, 23, 59, 58));
        scheduler.set_identity(Some("u1"));
        tokio::time::sleep(Duration::from_secs(1)).await;
        scheduler.teardown();
        assert!(!scheduler.is_active());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(target.calls().len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_scheduler_cancels() {
        let (target, mut scheduler) = scheduler(at(2024, 3, 14, 23, 59, 58));
        scheduler.set_identity(Some("u1"));
        drop(scheduler);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(target.calls().len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn identity_change_cancels_previous_user() {
        let (target, mut scheduler) = scheduler(at(2024, 3, 14, 23, 59, 58));
        scheduler.set_identity(Some("u1"));
        tokio::time::sleep(Duration::from_secs(1)).await;
        scheduler.set_identity(Some("u2"));
        assert_eq!(scheduler.user_id(), Some("u2"));

        tokio::time::sleep(Duration::from_secs(5)).await;
        let day = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap();
        assert_eq!(target.calls(), vec![("u2".to_string(), day)]);
    }

    #[tokio::test(start_paused = true)]
    async fn logout_and_empty_identity_stay_inactive() {
        let (target, mut scheduler) = scheduler(at(2024, 3, 14, 23, 59, 58));
        scheduler.set_identity(Some("u1"));
        scheduler.set_identity(None);
        assert!(!scheduler.is_active());
        scheduler.set_identity(Some("   "));
        assert!(!scheduler.is_active());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(target.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failure_waits_for_next_midnight() {
        let (target, mut scheduler) = scheduler(at(2024, 3, 14, 23, 59, 58));
        target.fail.store(true, Ordering::SeqCst);
        let mut events = scheduler.subscribe();
        scheduler.set_identity(Some("u1"));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(matches!(events.try_recv(), Ok(Event::RolloverFailed { .. })));
        assert_eq!(target.refreshes.load(Ordering::SeqCst), 0);
        assert!(scheduler.is_active());

        target.fail.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(target.calls().len(), 1);

        tokio::time::sleep(Duration::from_secs(86_400)).await;
        assert_eq!(target.calls().len(), 2);
        assert!(matches!(
            events.try_recv(),
            Ok(Event::RolloverCompleted { cleared: 3, .. })
        ));
    }
}
