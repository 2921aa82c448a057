use chrono::NaiveDate;

/// Consecutive active days ending today or yesterday.
///
/// `active_dates` must be sorted most recent first, without duplicates.
/// A streak whose latest day is yesterday still counts, so it survives
/// until the user has had a chance to study today.
pub fn current_streak(active_dates: &[NaiveDate], today: NaiveDate) -> u32 {
    let mut dates = active_dates.iter().copied().skip_while(|d| *d > today);

    let Some(anchor) = dates.next() else {
        return 0;
    };
    let yesterday = today.pred_opt();
    if anchor != today && Some(anchor) != yesterday {
        return 0;
    }

    let mut streak = 1;
    let mut expected = anchor.pred_opt();
    for date in dates {
        if Some(date) != expected {
            break;
        }
        streak += 1;
        expected = date.pred_opt();
    }
    streak
}

/// Longest run of consecutive active days anywhere in the history.
pub fn longest_streak(active_dates: &[NaiveDate]) -> u32 {
    let mut longest = 0;
    let mut run = 0;
    let mut previous: Option<NaiveDate> = None;

    for date in active_dates.iter().copied() {
        run = match previous {
            Some(prev) if prev.pred_opt() == Some(date) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        previous = Some(date);
    }
    longest
}
