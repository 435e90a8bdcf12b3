use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;
use tracing::info;

use crate::config::ThresholdConfig;
use crate::decision_engine::{Action, Recommendation};
use crate::metrics::KeywordStat;
use crate::providers::ProductInfo;

pub const DEFAULT_BID: f64 = 25.0;
pub const MIN_BID: f64 = 5.0;
pub const MAX_BID: f64 = 500.0;
const MAX_NEGATIVE_KEYWORDS: usize = 100;
pub const MAX_SUGGESTIONS: usize = 50;
const COMMON_PATTERN_WORDS: usize = 10;

const STOP_WORDS: [&str; 29] = [
  "и", "в", "на", "с", "по", "для", "от", "до", "из", "к", "о", "про", "при", "без", "над", "под", "через", "между",
  "среди", "около", "вокруг", "внутри", "снаружи", "сверху", "снизу", "спереди", "сзади", "слева", "справа",
];

const NEGATIVE_STEMS: [&str; 4] = ["дешев", "подделк", "копи", "фейк"];
const STOCK_NEGATIVES: [&str; 14] = [
  "бесплатно",
  "скачать",
  "торрент",
  "взлом",
  "crack",
  "обзор",
  "отзыв",
  "видео",
  "фото",
  "картинки",
  "вакансия",
  "работа",
  "резюме",
  "зарплата",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BidAdjustment {
  pub keyword: String,
  pub current_bid: f64,
  pub new_bid: f64,
  pub change_percent: f64,
  pub priority: u8,
  pub reason: String,
}

fn round2(v: f64) -> f64 {
  (v * 100.0).round() / 100.0
}

/// Turns bid recommendations into concrete bids, highest priority first.
///
/// Keywords without a known current bid start from [`DEFAULT_BID`]; results are clamped to
/// `[MIN_BID, MAX_BID]`.
pub fn plan_bid_adjustments(
  recs: &[Recommendation],
  current_bids: &HashMap<String, f64>,
  min_priority: u8,
) -> Vec<BidAdjustment> {
  let mut out: Vec<BidAdjustment> = recs
    .iter()
    .filter(|r| matches!(r.action, Action::IncreaseBid | Action::DecreaseBid))
    .filter(|r| r.priority >= min_priority)
    .filter_map(|r| {
      let delta = r.bid_delta_percent?;
      let current_bid = current_bids.get(&r.keyword).copied().unwrap_or(DEFAULT_BID);
      let new_bid = round2((current_bid * (1.0 + delta / 100.0)).clamp(MIN_BID, MAX_BID));
      Some(BidAdjustment {
        keyword: r.keyword.clone(),
        current_bid,
        new_bid,
        change_percent: delta,
        priority: r.priority,
        reason: r.reason.clone(),
      })
    })
    .collect();

  out.sort_by(|a, b| b.priority.cmp(&a.priority));
  out
}

pub fn generate_negative_keywords(stats: &[KeywordStat]) -> Vec<String> {
  let mut out = BTreeSet::<String>::new();

  for s in stats {
    let lower = s.keyword.to_lowercase();
    let poor_ctr = s.ratios().ctr < 0.1 && s.clicks > 20;
    for word in lower.split_whitespace().filter(|w| w.chars().count() > 3) {
      if poor_ctr || NEGATIVE_STEMS.iter().any(|stem| word.contains(stem)) {
        out.insert(word.to_string());
      }
    }

    if s.clicks > 50 && s.orders == 0 {
      out.insert(lower.trim().to_string());
    }
  }

  for word in STOCK_NEGATIVES {
    out.insert(word.to_string());
  }

  out.into_iter().take(MAX_NEGATIVE_KEYWORDS).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
  Broad,
  Phrase,
  Exact,
}

impl MatchType {
  pub fn as_str(&self) -> &'static str {
    match self {
      MatchType::Broad => "broad",
      MatchType::Phrase => "phrase",
      MatchType::Exact => "exact",
    }
  }
}

/// Longer queries get narrower matching.
pub fn suggest_match_type(keyword: &str) -> MatchType {
  match keyword.split_whitespace().count() {
    0 | 1 => MatchType::Broad,
    2 => MatchType::Phrase,
    _ => MatchType::Exact,
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionPriority {
  Medium,
  High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionSource {
  ProductTitle,
  BrandCombination,
  Category,
  Description,
}

impl SuggestionSource {
  pub fn priority(&self) -> SuggestionPriority {
    match self {
      SuggestionSource::ProductTitle | SuggestionSource::BrandCombination => SuggestionPriority::High,
      SuggestionSource::Category | SuggestionSource::Description => SuggestionPriority::Medium,
    }
  }

  /// Starting bid in RUB.
  pub fn suggested_bid(&self) -> f64 {
    match self {
      SuggestionSource::ProductTitle => DEFAULT_BID,
      SuggestionSource::BrandCombination => 30.0,
      SuggestionSource::Category => 20.0,
      SuggestionSource::Description => 15.0,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeywordSuggestion {
  pub keyword: String,
  pub source: SuggestionSource,
  pub priority: SuggestionPriority,
  pub suggested_bid: f64,
  pub match_type: MatchType,
}

fn is_stop_word(word: &str) -> bool {
  STOP_WORDS.contains(&word)
}

fn len(word: &str) -> usize {
  word.chars().count()
}

/// Lowercases and replaces everything but word characters, whitespace and `keep` with spaces.
fn clean(text: &str, keep: &[char]) -> String {
  text
    .to_lowercase()
    .chars()
    .map(|c| {
      if c.is_alphanumeric() || c == '_' || c.is_whitespace() || keep.contains(&c) {
        c
      } else {
        ' '
      }
    })
    .collect()
}

fn content_words(text: &str) -> Vec<String> {
  text
    .split_whitespace()
    .filter(|w| len(w) > 2 && !is_stop_word(w))
    .map(str::to_string)
    .collect()
}

fn title_keywords(title: &str) -> Vec<String> {
  let words = content_words(&clean(title, &['-']));
  let mut out = words.clone();
  for pair in words.windows(2) {
    out.push(pair.join(" "));
  }
  for triple in words.windows(3) {
    if len(&triple[0]) > 3 && len(&triple[1]) > 3 {
      out.push(triple.join(" "));
    }
  }
  out
}

fn brand_combinations(brand: &str, title: &str) -> Vec<String> {
  let words = content_words(&clean(title, &[]));
  let brand = brand.trim().to_lowercase();
  let mut out: Vec<String> = words
    .iter()
    .take(5)
    .filter(|w| !w.contains(&brand))
    .map(|w| format!("{brand} {w}"))
    .collect();
  for pair in words.windows(2).take(3) {
    out.push(format!("{brand} {} {}", pair[0], pair[1]));
  }
  out
}

fn category_keywords(category: &str, title: &str) -> Vec<String> {
  let title_words: Vec<String> = clean(title, &[]).split_whitespace().take(3).map(str::to_string).collect();
  let mut out = Vec::new();
  for cat_word in clean(category, &[]).split_whitespace().filter(|w| len(w) > 3) {
    out.push(cat_word.to_string());
    for title_word in title_words.iter().filter(|w| len(w) > 3 && *w != cat_word) {
      out.push(format!("{cat_word} {title_word}"));
    }
  }
  out
}

/// Three-word phrases over 10 characters and four-word phrases over 15, per sentence.
fn long_tail_keywords(description: &str) -> Vec<String> {
  let mut out = Vec::new();
  for sentence in clean(description, &['.', '-']).split('.') {
    let words = content_words(sentence);
    for phrase in words.windows(3).map(|w| w.join(" ")) {
      if len(&phrase) > 10 {
        out.push(phrase);
      }
    }
    for phrase in words.windows(4).map(|w| w.join(" ")) {
      if len(&phrase) > 15 {
        out.push(phrase);
      }
    }
  }
  out
}

fn has_cyrillic(keyword: &str) -> bool {
  keyword.chars().any(|c| matches!(c, 'а'..='я' | 'ё'))
}

/// Keyword ideas for a product from its title, brand, category and description.
///
/// High-priority sources come first; within a priority the generation order is kept. Keywords
/// are lowercased, deduplicated, must contain a Cyrillic letter and be 3 to 100 characters
/// long. At most [`MAX_SUGGESTIONS`] are returned.
pub fn suggest_keywords_from_product(product: &ProductInfo) -> Vec<KeywordSuggestion> {
  let mut candidates: Vec<(SuggestionSource, String)> = Vec::new();
  if !product.name.trim().is_empty() {
    candidates.extend(title_keywords(&product.name).into_iter().map(|k| (SuggestionSource::ProductTitle, k)));
    if !product.brand.trim().is_empty() {
      candidates.extend(
        brand_combinations(&product.brand, &product.name)
          .into_iter()
          .map(|k| (SuggestionSource::BrandCombination, k)),
      );
    }
  }
  if !product.category.trim().is_empty() {
    candidates.extend(
      category_keywords(&product.category, &product.name)
        .into_iter()
        .map(|k| (SuggestionSource::Category, k)),
    );
  }
  if !product.description.trim().is_empty() {
    candidates.extend(long_tail_keywords(&product.description).into_iter().map(|k| (SuggestionSource::Description, k)));
  }

  candidates.sort_by(|a, b| b.0.priority().cmp(&a.0.priority()));

  let mut seen = HashSet::new();
  let out: Vec<KeywordSuggestion> = candidates
    .into_iter()
    .filter_map(|(source, raw)| {
      let keyword = raw.trim().to_lowercase();
      let chars = len(&keyword);
      if !(3..=100).contains(&chars) || !has_cyrillic(&keyword) || !seen.insert(keyword.clone()) {
        return None;
      }
      Some(KeywordSuggestion {
        match_type: suggest_match_type(&keyword),
        keyword,
        source,
        priority: source.priority(),
        suggested_bid: source.suggested_bid(),
      })
    })
    .take(MAX_SUGGESTIONS)
    .collect();

  info!(product_id = %product.id, count = out.len(), "keyword suggestions generated");
  out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityKind {
  PatternBased,
  LongTail,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeywordOpportunity {
  pub kind: OpportunityKind,
  pub priority: SuggestionPriority,
  pub description: String,
  pub suggestions: Vec<String>,
  /// Common words for pattern ideas, short keywords for long-tail ideas.
  pub keywords: Vec<String>,
}

/// Ideas for new keywords drawn from what already performs.
///
/// Strong keywords (CTR and CR above the high marks, DRR under the acceptable level) yield
/// their most frequent words. One- and two-word keywords yield a long-tail idea.
pub fn find_keyword_opportunities(stats: &[KeywordStat], cfg: &ThresholdConfig) -> Vec<KeywordOpportunity> {
  let mut out = Vec::new();

  let mut freq: HashMap<String, usize> = HashMap::new();
  for s in stats {
    let r = s.ratios();
    if r.ctr > cfg.high_ctr && r.cr > cfg.high_cr && r.drr < cfg.max_acceptable_drr {
      for word in s.keyword.to_lowercase().split_whitespace() {
        *freq.entry(word.to_string()).or_insert(0) += 1;
      }
    }
  }
  if !freq.is_empty() {
    let mut words: Vec<(String, usize)> = freq.into_iter().collect();
    words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let common: Vec<String> = words.into_iter().take(COMMON_PATTERN_WORDS).map(|(w, _)| w).collect();
    out.push(KeywordOpportunity {
      kind: OpportunityKind::PatternBased,
      priority: SuggestionPriority::High,
      description: "Keywords built on successful patterns".to_string(),
      suggestions: vec![format!("Add variations with the words: {}", common.join(", "))],
      keywords: common,
    });
  }

  let short: Vec<String> = stats
    .iter()
    .filter(|s| s.keyword.split_whitespace().count() <= 2)
    .map(|s| s.keyword.clone())
    .collect();
  if !short.is_empty() {
    out.push(KeywordOpportunity {
      kind: OpportunityKind::LongTail,
      priority: SuggestionPriority::Medium,
      description: "Long-tail keyword phrases".to_string(),
      suggestions: vec![
        "Add longer variations of short keywords".to_string(),
        "Use geo modifiers".to_string(),
        "Add product attributes".to_string(),
      ],
      keywords: short,
    });
  }

  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::ThresholdConfig;
  use crate::decision_engine::evaluate_stats;

  fn stat(keyword: &str, impressions: u64, clicks: u64, orders: u64, spend: f64, revenue: f64) -> KeywordStat {
    KeywordStat {
      keyword: keyword.to_string(),
      match_type: None,
      impressions,
      clicks,
      orders,
      spend,
      revenue,
    }
  }

  #[test]
  fn plans_bids_with_default_and_clamp() {
    let recs = evaluate_stats(
      &[
        stat("star", 1000, 50, 5, 100.0, 1000.0),
        stat("pricey", 2000, 40, 2, 300.0, 1000.0),
        stat("capped", 1000, 50, 5, 100.0, 1000.0),
        stat("dead", 2000, 50, 0, 100.0, 0.0),
      ],
      &ThresholdConfig::default(),
    );
    let mut bids = HashMap::new();
    bids.insert("pricey".to_string(), 6.0);
    bids.insert("capped".to_string(), 450.0);

    let plan = plan_bid_adjustments(&recs, &bids, 0);
    assert_eq!(plan.len(), 3);
    assert_eq!(plan[2].keyword, "pricey");
    assert_eq!(plan[2].new_bid, MIN_BID);

    let star = plan.iter().find(|b| b.keyword == "star").unwrap();
    assert_eq!(star.current_bid, DEFAULT_BID);
    assert_eq!(star.new_bid, 30.0);

    let capped = plan.iter().find(|b| b.keyword == "capped").unwrap();
    assert_eq!(capped.new_bid, MAX_BID);

    let high_only = plan_bid_adjustments(&recs, &bids, 70);
    assert_eq!(high_only.len(), 2);
    assert!(high_only.iter().all(|b| b.change_percent > 0.0));
  }

  #[test]
  fn negative_keywords_are_sorted_unique_and_capped() {
    let negatives = generate_negative_keywords(&[
      stat("дешевые кроссовки", 1000, 5, 0, 1.0, 0.0),
      stat("сумка мужская для", 100_000, 30, 0, 1.0, 0.0),
      stat("рюкзак школьный", 1000, 60, 0, 1.0, 0.0),
      stat("хороший товар", 1000, 60, 3, 1.0, 100.0),
    ]);

    assert!(negatives.contains(&"дешевые".to_string()));
    assert!(negatives.contains(&"сумка".to_string()));
    assert!(negatives.contains(&"мужская".to_string()));
    assert!(negatives.contains(&"рюкзак школьный".to_string()));
    assert!(negatives.contains(&"бесплатно".to_string()));
    assert!(!negatives.contains(&"хороший".to_string()));
    // Short words never qualify on their own.
    assert!(!negatives.contains(&"для".to_string()));

    let mut sorted = negatives.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(negatives, sorted);

    let many: Vec<KeywordStat> = (0..200)
      .map(|i| stat(&format!("фраза{i:03}"), 1000, 60, 0, 1.0, 0.0))
      .collect();
    assert_eq!(generate_negative_keywords(&many).len(), MAX_NEGATIVE_KEYWORDS);
  }

  fn product() -> ProductInfo {
    ProductInfo {
      id: "555".to_string(),
      name: "Кеды женские белые кожаные".to_string(),
      description: "Лёгкие кожаные кеды для города. Подошва из натурального каучука!".to_string(),
      category: "Женская обувь".to_string(),
      brand: "Nordic".to_string(),
    }
  }

  #[test]
  fn product_suggestions_cover_every_source() {
    let suggestions = suggest_keywords_from_product(&product());
    let find = |k: &str| suggestions.iter().find(|s| s.keyword == k);

    let title = find("кеды женские").unwrap();
    assert_eq!(title.source, SuggestionSource::ProductTitle);
    assert_eq!(title.suggested_bid, DEFAULT_BID);
    assert_eq!(title.match_type, MatchType::Phrase);
    assert_eq!(find("кеды").unwrap().match_type, MatchType::Broad);
    assert_eq!(find("кеды женские белые").unwrap().match_type, MatchType::Exact);

    let brand = find("nordic кеды").unwrap();
    assert_eq!(brand.source, SuggestionSource::BrandCombination);
    assert_eq!(brand.suggested_bid, 30.0);
    assert!(find("nordic кеды женские").is_some());

    let category = find("обувь кеды").unwrap();
    assert_eq!(category.source, SuggestionSource::Category);
    assert_eq!(category.priority, SuggestionPriority::Medium);
    assert_eq!(find("женская").unwrap().source, SuggestionSource::Category);

    let long_tail = find("лёгкие кожаные кеды").unwrap();
    assert_eq!(long_tail.source, SuggestionSource::Description);
    assert_eq!(long_tail.suggested_bid, 15.0);
    assert!(find("подошва натурального каучука").is_some());
    // Phrases never cross sentence boundaries.
    assert!(find("города подошва натурального").is_none());

    let first_medium = suggestions.iter().position(|s| s.priority == SuggestionPriority::Medium).unwrap();
    assert!(suggestions[..first_medium].iter().all(|s| s.priority == SuggestionPriority::High));
    assert!(suggestions[first_medium..].iter().all(|s| s.priority == SuggestionPriority::Medium));
  }

  #[test]
  fn product_suggestions_are_filtered_unique_and_capped() {
    let suggestions = suggest_keywords_from_product(&ProductInfo {
      name: "Кеды кеды для 2024 и xl".to_string(),
      ..ProductInfo::default()
    });
    let keywords: Vec<&str> = suggestions.iter().map(|s| s.keyword.as_str()).collect();
    assert_eq!(keywords.iter().filter(|k| **k == "кеды").count(), 1);
    assert!(!keywords.contains(&"для"));
    assert!(!keywords.contains(&"2024"));
    assert!(keywords.contains(&"кеды 2024"));

    let long_name: Vec<String> = (0..40).map(|i| format!("слово{i:02}")).collect();
    let many = suggest_keywords_from_product(&ProductInfo {
      name: long_name.join(" "),
      ..ProductInfo::default()
    });
    assert_eq!(many.len(), MAX_SUGGESTIONS);

    assert!(suggest_keywords_from_product(&ProductInfo::default()).is_empty());
  }

  #[test]
  fn opportunities_from_strong_and_short_keywords() {
    let cfg = ThresholdConfig::default();
    let opportunities = find_keyword_opportunities(
      &[
        stat("кеды белые", 1000, 50, 5, 100.0, 1000.0),
        stat("кеды кожаные женские", 1000, 50, 5, 100.0, 1000.0),
        stat("сумка", 1000, 50, 0, 100.0, 0.0),
      ],
      &cfg,
    );
    assert_eq!(opportunities.len(), 2);

    let pattern = &opportunities[0];
    assert_eq!(pattern.kind, OpportunityKind::PatternBased);
    assert_eq!(pattern.priority, SuggestionPriority::High);
    assert_eq!(pattern.keywords[0], "кеды");
    assert_eq!(pattern.keywords.len(), 4);
    assert!(!pattern.keywords.contains(&"сумка".to_string()));

    let long_tail = &opportunities[1];
    assert_eq!(long_tail.kind, OpportunityKind::LongTail);
    assert_eq!(long_tail.keywords, vec!["кеды белые".to_string(), "сумка".to_string()]);
    assert_eq!(long_tail.suggestions.len(), 3);
  }

  #[test]
  fn no_opportunities_without_data() {
    assert!(find_keyword_opportunities(&[], &ThresholdConfig::default()).is_empty());

    // DRR at the acceptable level is not a strong pattern; three words are not short.
    let only_long = find_keyword_opportunities(
      &[stat("кеды кожаные женские", 1000, 50, 5, 250.0, 1000.0)],
      &ThresholdConfig::default(),
    );
    assert!(only_long.is_empty());
  }

  #[test]
  fn suggests_match_type_by_word_count() {
    assert_eq!(suggest_match_type("кроссовки"), MatchType::Broad);
    assert_eq!(suggest_match_type("кроссовки  мужские"), MatchType::Phrase);
    assert_eq!(suggest_match_type("кроссовки мужские 42"), MatchType::Exact);
  }
}
