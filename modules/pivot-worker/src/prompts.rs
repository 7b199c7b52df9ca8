//! Prompt construction for every model call in the pipeline. Selection and
//! decoration prompts carry the cumulative run context so the model enforces
//! the same diversity rules the code re-checks afterwards.

use pivot_common::types::NewsletterVariant;

use crate::jobs::context::{RecentIssueData, SelectionContext};

/// Topical focus per Pivot 5 slot, used by both prefilter and selection.
pub fn slot_focus(slot: u8) -> &'static str {
    match slot {
        1 => "Jobs, economy, stock market, broad societal impact. Must be FRESH (0-24 hours).",
        2 => "Tier 1 AI companies (OpenAI, Google, Meta, NVIDIA, Microsoft, Anthropic, xAI, Amazon), economic themes, research breakthroughs.",
        3 => "Industry verticals: Healthcare, Government, Education, Legal, Accounting, Retail, Security, Transportation, Manufacturing, Real Estate, Agriculture, Energy.",
        4 => "Emerging companies: product launches, fundraising, acquisitions, new AI tools. Must be FRESH (0-48 hours).",
        5 => "Consumer AI, human interest, ethics, entertainment, societal impact, fun/quirky uses.",
        _ => "",
    }
}

fn slot_criteria(slot: u8) -> &'static str {
    match slot {
        1 => "Review these candidates and identify ONLY stories about:\n\
              1. AI impact on JOBS (layoffs, hiring, workforce changes, labor market shifts)\n\
              2. AI impact on ECONOMY (GDP, productivity, economic shifts, market trends)\n\
              3. AI STOCK MARKET / VALUATIONS (market moves, IPOs, funding rounds, valuations)\n\
              4. BROAD AI IMPACT (societal, regulatory impact - NOT company-specific product launches)\n\n\
              IMPORTANT EXCLUSIONS:\n\
              - Do NOT include simple product launches or feature updates\n\
              - Do NOT include stories that are primarily about a single company's products\n\
              - Focus on BROAD impact stories that affect multiple companies or the industry",
        2 => "Review these candidates and identify stories about:\n\
              1. TIER 1 AI COMPANIES: OpenAI, Google/DeepMind, Meta, NVIDIA, Microsoft, Anthropic, xAI, Amazon\n\
              2. Major product launches, updates, or news from these Tier 1 companies\n\
              3. AI research papers, studies, or insight pieces from credible sources\n\
              4. Broad AI industry analysis or trends\n\n\
              IMPORTANT:\n\
              - Tier 1 company news belongs HERE, not in Slot 4 (Emerging Companies)\n\
              - Research/insight pieces should be from credible sources",
        3 => "Review these candidates and identify stories about AI's impact on NON-TECH INDUSTRIES:\n\
              Healthcare, Government, Education, Legal, Accounting/Finance (traditional),\n\
              Retail, Security/Defense, Transportation, Manufacturing, Real Estate,\n\
              Agriculture, Energy/Utilities.\n\n\
              IMPORTANT EXCLUSIONS:\n\
              - Do NOT include stories primarily about TECH companies or startups\n\
              - Do NOT include human interest or consumer-focused stories\n\
              - Focus on how AI is transforming traditional industries",
        4 => "Review these candidates and identify stories about:\n\
              1. Smaller/emerging AI companies (NOT Tier 1 giants)\n\
              2. AI startup news: funding rounds, acquisitions, partnerships\n\
              3. New AI product launches from non-Tier-1 companies\n\
              4. Innovative AI tools and applications from emerging players\n\n\
              TIER 1 COMPANIES TO EXCLUDE (these go in Slot 2):\n\
              OpenAI, Google, Meta, NVIDIA, Microsoft, Anthropic, xAI, Amazon",
        5 => "Review these candidates and identify stories about:\n\
              1. AI's impact on HUMANITY and SOCIETY (philosophical, ethical)\n\
              2. Consumer AI products (apps, tools for everyday people)\n\
              3. AI in ARTS, ENTERTAINMENT, and CREATIVITY\n\
              4. Fun, quirky, surprising, or unusual uses of AI\n\
              5. \"Nice to know\" stories (not \"need to know\" business news)\n\n\
              This slot is for lighter, more human-interest stories that readers will enjoy.",
        _ => "",
    }
}

/// System prompt for one slot's batch prefilter call.
pub fn prefilter_system(slot: u8, yesterday_headlines: &[String]) -> String {
    let yesterday = if yesterday_headlines.is_empty() {
        "None".to_string()
    } else {
        yesterday_headlines
            .iter()
            .map(|h| format!("- {h}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "You are a pre-filter for an AI newsletter's Slot {slot}.\n\n\
         {}\n\n\
         YESTERDAY'S HEADLINES (avoid similar topics):\n{yesterday}",
        slot_criteria(slot)
    )
}

/// System prompt for one slot's selection call.
pub fn selection_system(
    variant: NewsletterVariant,
    slot: u8,
    recent: &RecentIssueData,
    ctx: &SelectionContext,
) -> String {
    let yesterday = bullet_list(&recent.yesterday_headlines);
    let selected_today = if ctx.selected_story_ids.is_empty() {
        "(none yet)".to_string()
    } else {
        ctx.selected_story_ids.join(", ")
    };
    let companies = if ctx.selected_companies.is_empty() {
        "(none yet)".to_string()
    } else {
        ctx.selected_companies.join(", ")
    };
    let sources = if ctx.selected_sources.is_empty() {
        "(none yet)".to_string()
    } else {
        let mut counts: Vec<String> = ctx
            .selected_sources
            .iter()
            .map(|(source, count)| format!("{source}: {count}"))
            .collect();
        counts.sort();
        counts.join(", ")
    };

    let mut prompt = format!(
        "You are a senior editor for {}, a daily AI industry newsletter with professional subscribers.\n\n\
         SLOT {slot} FOCUS: {}\n\n\
         EDITORIAL RULES:\n\
         1. YESTERDAY'S HEADLINES - Do NOT select stories covering the same topics:\n{yesterday}\n\n\
         2. ALREADY SELECTED TODAY - Do NOT select these story IDs:\n   {selected_today}\n\n\
         3. COMPANY DIVERSITY - Each company appears at most ONCE across the issue:\n   Already featured today: {companies}\n\n\
         4. SOURCE DIVERSITY - Max 2 stories per source per day:\n   Already used today: {sources}\n",
        variant.display_name(),
        slot_focus(slot),
    );

    // Slot 1 rotates companies across two days; the model infers the company
    // from yesterday's headline.
    if slot == 1 {
        if let Some(headline) = &recent.yesterday_slot1_headline {
            prompt.push_str(&format!(
                "\n5. TWO-DAY ROTATION (Slot 1 only) - Yesterday's Slot 1 headline was:\n   \
                 \"{headline}\"\n   \
                 Infer the featured company and do NOT feature it again today.\n"
            ));
        }
    }

    prompt.push_str(
        "\nSELECTION CRITERIA:\n\
         - High news value and relevance to AI professionals\n\
         - Strong source credibility\n\
         - Appropriate freshness for this slot\n\
         - Diverse from other selected stories\n\n\
         Return JSON with:\n\
         - selected_id: the chosen story's id\n\
         - selected_fingerprint: the chosen story's fingerprint\n\
         - selected_headline: the chosen story's headline\n\
         - selected_source: the story's source\n\
         - selected_company: primary company mentioned (or null)\n\
         - reasoning: 1-2 sentence explanation",
    );

    prompt
}

/// User prompt listing the slot's candidates.
pub fn selection_user(candidates: &[CandidateLine]) -> String {
    let mut prompt = String::from("CANDIDATE STORIES:\n\n");
    for (i, candidate) in candidates.iter().enumerate() {
        prompt.push_str(&format!(
            "Story {n}:\n\
             - id: {id}\n\
             - fingerprint: {fingerprint}\n\
             - headline: {headline}\n\
             - source: {source}\n\
             - published: {published}\n\n",
            n = i + 1,
            id = candidate.id,
            fingerprint = candidate.fingerprint,
            headline = candidate.headline,
            source = candidate.source,
            published = candidate.published,
        ));
    }
    prompt.push_str("Select the BEST story for this slot. Return JSON only.");
    prompt
}

/// One candidate row as it appears in the selection prompt.
pub struct CandidateLine {
    pub id: String,
    pub fingerprint: String,
    pub headline: String,
    pub source: String,
    pub published: String,
}

/// Prompt for selecting the five Signal quick-hits in one call.
pub fn quick_hit_selection(candidates: &[CandidateLine], excluded_headlines: &str) -> String {
    let mut prompt = format!(
        "You are a senior editor for Signal, picking the five SIGNALS quick-hits.\n\n\
         These are short, scannable items: breadth over depth. Pick FIVE distinct\n\
         stories, each about a different company and topic.\n\n\
         ALREADY USED (do not repeat these):\n{excluded_headlines}\n\n"
    );
    prompt.push_str(&selection_user(candidates));
    prompt.push_str(
        "\n\nReturn JSON only:\n\
         {\"selections\": [{\"selected_id\": \"...\", \"selected_fingerprint\": \"...\", \
         \"selected_headline\": \"...\", \"selected_source\": \"...\", \
         \"selected_company\": null}]}\n\
         Exactly five entries.",
    );
    prompt
}

pub fn subject_line(headlines: &[String]) -> String {
    format!(
        "Generate a compelling email subject line for this daily AI newsletter.\n\n\
         TODAY'S HEADLINES:\n{}\n\n\
         REQUIREMENTS:\n\
         - Maximum 60 characters\n\
         - Create urgency and curiosity\n\
         - Reference 1-2 key stories\n\
         - Avoid clickbait, be substantive\n\
         - Match professional newsletter tone\n\n\
         Return ONLY the subject line, no quotes or explanation.",
        numbered_list(headlines)
    )
}

pub fn issue_summary(headlines: &[String], max_words: u32) -> String {
    format!(
        "Summarize today's AI newsletter in exactly {max_words} words or fewer.\n\n\
         HEADLINES:\n{}\n\n\
         Write a single sentence summarizing the key themes. Professional tone.\n\
         Return ONLY the summary, no explanation.",
        numbered_list(headlines)
    )
}

pub fn content_cleaner(markdown: &str) -> String {
    format!(
        "Clean the following article content by removing:\n\
         - Navigation elements and menus\n\
         - Advertisements and promotional blocks\n\
         - Footers, cookie banners, and subscription prompts\n\
         - Related-article links and social sharing widgets\n\n\
         Keep the article's own paragraphs intact and in order.\n\
         Return ONLY the cleaned article text.\n\n\
         ARTICLE:\n{markdown}"
    )
}

pub fn scoring(title: &str, source: &str, content: &str) -> String {
    format!(
        "You are triaging articles for a professional AI industry newsletter.\n\n\
         HEADLINE: {title}\n\
         SOURCE: {source}\n\n\
         ARTICLE CONTENT:\n{content}\n\n\
         Rate this article's interest to AI professionals and classify it.\n\n\
         Return ONLY valid JSON:\n\
         {{\"interest_score\": 0-10, \"topic\": \"short topic tag\", \
         \"sentiment\": \"positive|neutral|negative\"}}"
    )
}

/// Pivot 5 decoration: headline, dek, three bullets, label, image prompt.
pub fn decorate_pivot5(headline: &str, source: &str, topic: &str, content: &str) -> String {
    format!(
        "You are decorating a story for Pivot 5, a professional AI newsletter.\n\n\
         ORIGINAL HEADLINE: {headline}\n\
         SOURCE: {source}\n\
         TOPIC: {topic}\n\n\
         ARTICLE CONTENT:\n{content}\n\n\
         Generate the following in JSON format:\n\n\
         1. headline: Punchy headline in Title Case. Max 80 characters. Create intrigue.\n\
         2. dek: One sentence hook that expands on the headline. Professional tone.\n\
         3. b1: First bullet - Main announcement (2 sentences, max 260 characters). Start with an action verb.\n\
         4. b2: Second bullet - Key details/context (2 sentences, max 260 characters).\n\
         5. b3: Third bullet - Business impact or \"why it matters\" (2 sentences, max 260 characters).\n\
         6. label: Topic label in ALL CAPS (e.g., \"JOBS & ECONOMY\", \"BIG TECH\", \"HEALTHCARE AI\", \"EMERGING TECH\", \"CONSUMER AI\")\n\
         7. image_prompt: Description for AI image generation. Professional, editorial style. Abstract representation of the story theme. No text, logos, or faces.\n\n\
         Return JSON only."
    )
}

/// Bolding pass: one key phrase per bullet, HTML tags.
pub fn bolding(b1: &str, b2: &str, b3: &str) -> String {
    format!(
        "Apply HTML bold (<b>text</b>) to 1-2 key phrases in each bullet point.\n\
         Bold the most impactful/newsworthy phrases.\n\n\
         Bullet 1: {b1}\n\
         Bullet 2: {b2}\n\
         Bullet 3: {b3}\n\n\
         Return ONLY valid JSON:\n\
         {{\"b1\": \"...\", \"b2\": \"...\", \"b3\": \"...\"}}"
    )
}

/// Signal full-section decoration: one-liner, lead, why-it-matters,
/// what's-next.
pub fn decorate_signal_full(
    headline: &str,
    source: &str,
    section_name: &str,
    content: &str,
) -> String {
    format!(
        "You are an expert newsletter editor creating content for the Signal AI newsletter.\n\n\
         ## AUDIENCE\n\
         - CEOs, founders, and senior business leaders\n\
         - Busy professionals who want actionable insights\n\n\
         ## VOICE & STYLE\n\
         - Confident, clear, informed\n\
         - Present tense, active voice\n\
         - No jargon, no hedging (avoid \"could/might/possibly\")\n\n\
         ## OUTPUT FORMAT\n\
         Return ONLY valid JSON:\n\n\
         {{\n\
           \"headline\": \"Title Case headline, one sentence, NO colons or semi-colons\",\n\
           \"one_liner\": \"One compelling sentence for the at-a-glance list\",\n\
           \"lead\": \"2-3 sentences introducing the story. Separate paragraphs with a blank line.\",\n\
           \"why_it_matters\": \"EXACTLY two bullets, each starting with '\\u{{2022}} ' on its own line. Bold one key phrase per bullet with <b></b>.\",\n\
           \"whats_next\": \"EXACTLY two bullets, each starting with '\\u{{2022}} ' on its own line. Bold one key phrase per bullet with <b></b>.\",\n\
           \"source\": \"Publication name\"\n\
         }}\n\n\
         === ARTICLE METADATA ===\n\
         Headline: {headline}\n\
         Source: {source}\n\
         Section: {section_name}\n\n\
         === ARTICLE CONTENT ===\n\
         {content}\n\n\
         Return ONLY the JSON object. No commentary, no code fences."
    )
}

/// Signal quick-hit decoration: headline plus a one-sentence blurb.
pub fn decorate_signal_quick_hit(headline: &str, source: &str, content: &str) -> String {
    format!(
        "You are an expert newsletter editor creating quick-hit content for the SIGNALS section.\n\n\
         ## SIGNALS Format\n\
         Each SIGNALS item is a quick scan: one headline, one sentence of context.\n\n\
         ## OUTPUT FORMAT\n\
         Return ONLY valid JSON:\n\n\
         {{\n\
           \"headline\": \"Title Case headline, one sentence, max 12 words, NO colons\",\n\
           \"signal_blurb\": \"EXACTLY one sentence, 25 words or fewer, saying what happened and why it matters.\",\n\
           \"source\": \"Publication name\"\n\
         }}\n\n\
         === ARTICLE METADATA ===\n\
         Headline: {headline}\n\
         Source: {source}\n\n\
         === ARTICLE CONTENT ===\n\
         {content}\n\n\
         Return ONLY the JSON object. No commentary."
    )
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        "   (none)".to_string()
    } else {
        items
            .iter()
            .map(|i| format!("   - {i}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn numbered_list(items: &[String]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {item}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefilter_system_includes_criteria_and_history() {
        let prompt = prefilter_system(1, &["Old Headline".to_string()]);
        assert!(prompt.contains("Slot 1"));
        assert!(prompt.contains("JOBS"));
        assert!(prompt.contains("- Old Headline"));
    }

    #[test]
    fn prefilter_system_handles_empty_history() {
        let prompt = prefilter_system(3, &[]);
        assert!(prompt.contains("None"));
    }

    #[test]
    fn selection_system_carries_cumulative_state() {
        let mut ctx = SelectionContext::default();
        ctx.selected_story_ids.push("rec001".into());
        ctx.selected_companies.push("Nvidia".into());
        *ctx.selected_sources.entry("TechCrunch".into()).or_insert(0) += 2;

        let recent = RecentIssueData {
            yesterday_slot1_headline: Some("Nvidia Eyes $3B Deal".into()),
            ..Default::default()
        };

        let prompt = selection_system(NewsletterVariant::Pivot5, 1, &recent, &ctx);
        assert!(prompt.contains("rec001"));
        assert!(prompt.contains("Nvidia"));
        assert!(prompt.contains("TechCrunch: 2"));
        assert!(prompt.contains("TWO-DAY ROTATION"));
    }

    #[test]
    fn two_day_rotation_only_applies_to_slot_one() {
        let recent = RecentIssueData {
            yesterday_slot1_headline: Some("Nvidia Eyes $3B Deal".into()),
            ..Default::default()
        };
        let ctx = SelectionContext::default();
        let prompt = selection_system(NewsletterVariant::Pivot5, 2, &recent, &ctx);
        assert!(!prompt.contains("TWO-DAY ROTATION"));
    }
}
