use crate::kernel::traits::ReviewSummary;

use super::models::BusinessProfile;

fn business_line(business: &BusinessProfile) -> String {
    let name = if business.name.trim().is_empty() {
        "a local business"
    } else {
        business.name.trim()
    };
    match business.category.as_deref() {
        Some(category) => format!("{name} ({category})"),
        None => name.to_string(),
    }
}

pub fn post_prompt(business: &BusinessProfile) -> String {
    let mut prompt = format!(
        "Write a short Google Business Profile update for {}.\n",
        business_line(business)
    );
    if !business.keywords.is_empty() {
        prompt.push_str(&format!(
            "Work in some of these keywords naturally: {}.\n",
            business.keywords.join(", ")
        ));
    }
    prompt.push_str(
        "Keep it under 1200 characters, friendly and specific. \
         Plain text only, no hashtags, no placeholders, no phone numbers.",
    );
    prompt
}

pub fn reply_prompt(business: &BusinessProfile, review: &ReviewSummary) -> String {
    let reviewer = review
        .reviewer_name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or("the customer");
    let comment = review
        .comment
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .unwrap_or("(no written comment)");
    let tone = match review.star_rating {
        1 | 2 => "Apologise sincerely and invite them to get in touch so you can make it right.",
        3 => "Thank them and acknowledge anything they felt could be better.",
        _ => "Thank them warmly.",
    };

    format!(
        "You are the owner of {}. Reply to this {}-star review from {}.\n\
         Review: {}\n\
         {} Keep it to two or three sentences. Plain text only.",
        business_line(business),
        review.star_rating,
        reviewer,
        comment,
        tone,
    )
}
