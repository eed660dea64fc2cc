use chrono::{DateTime, Duration, TimeZone, Utc};
use kioku_core::{
    aggregate_stats, apply_review, daily_streak, filter_by_kind, filter_by_optional_kind,
    select_due_queue, study_streak, Card, CardKind, Rating, ReviewLog,
};

fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap() + Duration::days(n)
}

/// A card whose last review at `reviewed` scheduled it `interval` days out.
fn scheduled(front: &str, reviewed: i64, interval: u32) -> Card {
    let mut c = Card::new(CardKind::Vocabulary, front, "-");
    c.review = apply_review(&c.review, Rating::Good, day(reviewed));
    c.review.interval_days = interval;
    c.review.next_review_at = Some(day(reviewed + i64::from(interval)));
    c
}

fn fronts<'a>(it: impl IntoIterator<Item = &'a Card>) -> Vec<String> {
    it.into_iter().map(|c| c.front.clone()).collect()
}

#[test]
fn new_cards_first_then_earliest_due() {
    let a = scheduled("A", 3, 2); // due day 5
    let b = Card::new(CardKind::Kanji, "B", "-");
    let c = scheduled("C", 1, 2); // due day 3
    let cards = vec![a, b, c];

    let q = select_due_queue(&cards, day(10));
    assert_eq!(fronts(&q), vec!["B", "C", "A"]);
}

#[test]
fn cards_not_yet_due_are_left_out() {
    let later = scheduled("later", 9, 4); // due day 13
    let now_due = scheduled("now", 8, 2); // due day 10
    let cards = vec![later, now_due];

    let q = select_due_queue(&cards, day(10));
    assert_eq!(q.len(), 1);
    assert_eq!(fronts(q), vec!["now"]);
}

#[test]
fn ties_keep_input_order_and_requery_is_identical() {
    let cards = vec![
        scheduled("x", 0, 2),
        Card::new(CardKind::Grammar, "n1", "-"),
        scheduled("y", 0, 2),
        Card::new(CardKind::Grammar, "n2", "-"),
        scheduled("z", 0, 2),
    ];

    let q = select_due_queue(&cards, day(5));
    let first = fronts(q.iter());
    let second = fronts(q.iter());
    assert_eq!(first, vec!["n1", "n2", "x", "y", "z"]);
    assert_eq!(first, second);
    assert_eq!(fronts(select_due_queue(&cards, day(5))), first);
}

#[test]
fn take_vec_applies_limit() {
    let cards: Vec<Card> = (0..5)
        .map(|i| Card::new(CardKind::Vocabulary, format!("w{i}"), "-"))
        .collect();
    let q = select_due_queue(&cards, day(0));
    assert_eq!(q.take_vec(Some(2)).len(), 2);
    assert_eq!(q.take_vec(None).len(), 5);
    assert!(select_due_queue(&[], day(0)).is_empty());
}

#[test]
fn stats_on_empty_collection() {
    let s = aggregate_stats(&[], day(0));
    assert_eq!(s.total_words, 0);
    assert_eq!(s.learned_words, 0);
    assert_eq!(s.due_today, 0);
    assert_eq!(s.total_reviews, 0);
    assert_eq!(s.accuracy, 0);
    assert_eq!(s.streak, 0);
    assert_eq!(s.mastery_percentage, 0.0);
}

#[test]
fn stats_accuracy_is_zero_without_reviews() {
    let cards = vec![
        Card::new(CardKind::Kanji, "日", "sun"),
        Card::new(CardKind::Kanji, "月", "moon"),
    ];
    let s = aggregate_stats(&cards, day(0));
    assert_eq!(s.total_words, 2);
    assert_eq!(s.due_today, 2);
    assert_eq!(s.accuracy, 0);
    assert_eq!(s.mastery_percentage, 0.0);
}

#[test]
fn stats_over_mixed_history() {
    let mut a = Card::new(CardKind::Vocabulary, "食べる", "to eat");
    for (r, d) in [(Rating::Good, 0), (Rating::Easy, 2), (Rating::Again, 8)] {
        a.review = apply_review(&a.review, r, day(d));
    }
    let mut b = Card::new(CardKind::Vocabulary, "飲む", "to drink");
    for (r, d) in [(Rating::Good, 0), (Rating::Good, 2)] {
        b.review = apply_review(&b.review, r, day(d));
    }
    let c = Card::new(CardKind::Vocabulary, "見る", "to see");

    // a: due day 9, b: due day 6, c: new
    let s = aggregate_stats(&[a, b, c], day(7));
    assert_eq!(s.total_words, 3);
    assert_eq!(s.learned_words, 2);
    assert_eq!(s.due_today, 2);
    assert_eq!(s.total_reviews, 5);
    assert_eq!(s.accuracy, 80);
    assert_eq!(s.streak, 2);
    assert!((s.mastery_percentage - 200.0 / 3.0).abs() < 1e-9);
}

#[test]
fn accuracy_rounds_to_nearest() {
    let mut a = Card::new(CardKind::Grammar, "〜ながら", "while");
    for (r, d) in [(Rating::Good, 0), (Rating::Again, 1), (Rating::Again, 2)] {
        a.review = apply_review(&a.review, r, day(d));
    }
    // 1 of 3 correct
    assert_eq!(aggregate_stats(&[a.clone()], day(3)).accuracy, 33);

    a.review = apply_review(&a.review, Rating::Good, day(3));
    a.review = apply_review(&a.review, Rating::Good, day(5));
    // 3 of 5 correct
    assert_eq!(aggregate_stats(&[a], day(3)).accuracy, 60);
}

#[test]
fn stats_json_shape() {
    let v = serde_json::to_value(aggregate_stats(&[], day(0))).unwrap();
    for key in [
        "totalWords",
        "learnedWords",
        "dueToday",
        "totalReviews",
        "accuracy",
        "streak",
        "masteryPercentage",
    ] {
        assert!(v.get(key).is_some(), "missing {key}");
    }
}

#[test]
fn kind_filter_feeds_queue() {
    let cards = vec![
        Card::new(CardKind::Kanji, "水", "water"),
        Card::new(CardKind::Grammar, "〜たい", "want to"),
        Card::new(CardKind::Kanji, "火", "fire"),
    ];
    let kanji = filter_by_kind(cards, CardKind::Kanji);
    assert_eq!(fronts(select_due_queue(&kanji, day(0))), vec!["水", "火"]);
}

#[test]
fn daily_streak_counts_back_from_today() {
    let card = Card::new(CardKind::Vocabulary, "猫", "cat");
    let logs = vec![
        ReviewLog::new(card.id, Rating::Good, day(0), 2),
        ReviewLog::new(card.id, Rating::Good, day(2), 4),
        ReviewLog::new(card.id, Rating::Again, day(3), 1),
        ReviewLog::new(card.id, Rating::Good, day(3) + Duration::hours(2), 2),
        ReviewLog::new(card.id, Rating::Easy, day(4), 6),
    ];
    assert_eq!(daily_streak(&logs, day(4).date_naive()), 3);
    assert_eq!(daily_streak(&logs, day(5).date_naive()), 0);
    assert_eq!(daily_streak(&logs, day(0).date_naive()), 1);
    assert_eq!(daily_streak(&[], day(0).date_naive()), 0);
}

#[test]
fn study_streak_ignores_other_cards() {
    let kanji = Card::new(CardKind::Kanji, "山", "mountain");
    let grammar = Card::new(CardKind::Grammar, "〜ながら", "while");
    let logs = vec![
        ReviewLog::new(kanji.id, Rating::Good, day(3), 2),
        ReviewLog::new(grammar.id, Rating::Good, day(2), 2),
        ReviewLog::new(grammar.id, Rating::Good, day(3), 4),
    ];
    let cards = vec![kanji.clone(), grammar.clone()];

    let only_kanji = filter_by_optional_kind(cards.clone(), Some(CardKind::Kanji));
    assert_eq!(study_streak(&only_kanji, &logs, day(3).date_naive()), 1);
    let all = filter_by_optional_kind(cards, None);
    assert_eq!(study_streak(&all, &logs, day(3).date_naive()), 2);
    assert_eq!(study_streak(&[], &logs, day(3).date_naive()), 0);
}

#[test]
fn card_json_uses_camel_case() {
    let card = Card::new(CardKind::Vocabulary, "空", "sky");
    let v = serde_json::to_value(&card).unwrap();
    assert!(v.get("createdAt").is_some());
    assert!(v.get("created_at").is_none());
    assert_eq!(v["kind"], "vocabulary");
    assert_eq!(v["review"]["intervalDays"], 1);

    let back: Card = serde_json::from_value(v).unwrap();
    assert_eq!(back, card);
}
