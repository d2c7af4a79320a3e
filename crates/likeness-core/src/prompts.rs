//! Prompt templates and mutation catalogs for each generation stage.

use crate::models::Mutation;

/// Placeholder in [`ANCHOR_BASE_PROMPT`] replaced by the selected mutation text.
pub const MUTATION_PLACEHOLDER: &str = "{mutation}";

/// Anchor template. Every reference image is a seedream output of the same person.
pub const ANCHOR_BASE_PROMPT: &str = r#"Create a realistic portrait photo that perfectly blends the identity from all reference images.

SUBJECT:
- Use all uploaded images as exact identity reference
- Preserve original facial structure, proportions, nose bridge, skin tone, and hairline
- Keep the facial features of the person in the uploaded images exactly consistent. Same person, same face, same age
- Slightly smaller, more petite face proportions while maintaining identity
- Larger expressive almond-shaped eyes with subtle visible double eyelids and brighter clarity, while maintaining the person's natural eye characteristics
- Softer petite jawline with gentle feminine contour, while maintaining the person's natural facial structure
- Plumper natural glossy lips, while maintaining the person's natural lip shape and characteristics
- Neutral to slightly curious expression, relaxed face
- Simple, natural posture with relaxed shoulders and arms at sides or resting naturally
- No objects in hands, no phone visible
- Framing: chest-up to waist portrait clearly showing head, shoulders, bust, and waist (NOT zoomed in face-only)
- Natural, unstyled hair with realistic strands visible
- Natural skin texture visible, subtle imperfections allowed
- Natural feminine proportions with full well-defined bust and visible waist/torso in frame
- Attractive, appealing appearance with natural enhancement

PHOTOGRAPHY:
- Amateur phone selfie, front-facing eye-level view (strictly portrait orientation, no sideways/landscape)
- Standard smartphone lens (NOT zoomed in)
- Vertical chest-up to waist portrait framing (head to waist visible, 9:16 aspect ratio)
- If it looks zoomed in or sideways → it's wrong
- No phone screen, UI elements, or mirror reflections visible
- Output image dimensions: 2160x3840 pixels (9:16 aspect ratio, 4K resolution)

LIGHTING:
- Soft natural daylight
- Evenly lit, no dramatic shadows
- Realistic phone camera lighting (slightly uneven is fine)

SKIN & TEXTURE:
- Natural skin texture with visible pores and subtle grain
- Light realistic smartphone camera noise
- Minor natural imperfections allowed; no heavy bumps or unevenness
- No airbrushing or beauty filters, but avoid excessive grain
- Soft healthy glow from skincare, textured but not raw

BACKGROUND:
- Plain, real-world surface (neutral wall or outdoor)
- Not studio, not blurred
- Real-world environment

CONSTRAINTS:
- Style: unposed real photo, not model shoot
- Amateur smartphone photo look, not professional studio
- Natural enhancement for attractiveness, no beauty filters or airbrushing
- Change only {mutation}"#;

/// Enhancement prompt sent with every seedream request.
pub const SEEDREAM_PROMPT: &str = r#"Reference this image, keeping the same person with her original identity and overall gentle temperament entirely unchanged. Preserve pose, framing, lighting, background, facial structure, expression, and proportions. The person must have exactly two hands, naturally positioned as in the original image. Perform targeted optimization based solely on existing features without any drastic reshaping, ensuring high attractiveness, facial symmetry, and harmonious proportions aligned with East Asian beauty ideals.

Enhance skin quality: make the skin significantly whiter yet highly clean, delicate, even, hydrated, and translucent with a soft natural glow resembling perfect long-term skincare and glass-like porcelain texture. Retain realistic texture while avoiding any waxy or plastic feel or obvious edits.

Apply subtle K-pop style makeup: light foundation, straight brows, gradient pink lips, soft eyeliner, long lashes, subtle double eyelids, aegyo-sal under-eye highlights for a cute youthful charm, and natural blush for a fresh youthful look with a dewy, radiant finish.

Enhance eyes: slightly enlarge and brighten the eyes on their original basis to enhance clarity and roundness with natural proportions and no exaggeration. Softly fill the under-eye area without any filler traces, making them more expressive, almond-shaped yet rounded, with a captivating sparkle and perfect symmetry.

Refine facial contours: lightly refine for a cleaner jawline that remains soft and feminine, with a small balanced face shape achieving a gentle V-line for elegance without overly sharpening. Perform only minor subtle refinements on the nose to add a slim, high bridge and lips to make them plumper and more defined while keeping their original proportions and ensuring overall facial harmony.

Maintain realistic body proportions with a slightly fuller chest that conforms naturally without exaggeration or fabric distortion. Ensure clothing remains exactly as in the original with no changes or added exposure, strictly following real fabric physics.

Achieve an overall highly refined yet believably natural close-up photo in amateur style under good natural lighting with true colors. Photorealistic, no stylization, sharp focus, masterpiece quality with detailed, attractive facial features."#;

/// Anchor mutations. Records 0..5 use the first, 5..10 the second.
pub fn anchor_mutations() -> Vec<Mutation> {
    vec![
        Mutation::templated(
            "angle-left",
            "camera rotated 15 degrees left, subject remains centered, eye-level",
        ),
        Mutation::templated(
            "angle-right",
            "camera rotated 15 degrees right, subject remains centered, eye-level",
        ),
    ]
}

/// Variant mutations, one per variant record, each with its literal prompt.
pub fn variant_mutations() -> Vec<Mutation> {
    vec![
        Mutation::literal(
            "angle-left",
            "slight 15-20 degree camera yaw left",
            "Keep the facial features of the person in the uploaded image exactly consistent. Same person, same face, same age. Change only camera angle: slight 15-20 degree camera yaw left. Neutral expression, relaxed face. Natural skin texture visible. Close distance, amateur smartphone photo look, eye-level. Soft natural daylight, evenly lit.",
        ),
        Mutation::literal(
            "angle-right",
            "slight 15-20 degree camera yaw right",
            "Keep the facial features of the person in the uploaded image exactly consistent. Same person, same face, same age. Change only camera angle: slight 15-20 degree camera yaw right. Neutral expression, relaxed face. Natural skin texture visible. Close distance, amateur smartphone photo look, eye-level. Soft natural daylight, evenly lit.",
        ),
        Mutation::literal(
            "light-left",
            "soft natural light from camera-left",
            "Keep the facial features of the person in the uploaded image exactly consistent. Same person, same face, same age. Change only lighting direction: soft natural light from camera-left. Neutral expression, relaxed face. Natural skin texture visible. Close distance, amateur smartphone photo look, eye-level. Evenly lit, no dramatic shadows.",
        ),
        Mutation::literal(
            "light-right",
            "soft natural light from camera-right",
            "Keep the facial features of the person in the uploaded image exactly consistent. Same person, same face, same age. Change only lighting direction: soft natural light from camera-right. Neutral expression, relaxed face. Natural skin texture visible. Close distance, amateur smartphone photo look, eye-level. Evenly lit, no dramatic shadows.",
        ),
        Mutation::literal(
            "distance-medium",
            "medium chest-up portrait distance",
            "Keep the facial features of the person in the uploaded image exactly consistent. Same person, same face, same age. Change only camera distance: medium chest-up portrait distance showing head, shoulders, and upper torso. Neutral expression, relaxed face. Natural skin texture visible. Amateur smartphone photo look, eye-level. Soft natural daylight, evenly lit.",
        ),
    ]
}

/// Face-suitability criteria sent after the image count header.
const CLASSIFIER_CRITERIA: &str = r#" for identity cloning suitability. For each photo:

1. Detect faces - REJECT if no face detected or multiple faces detected (must be single person only)
2. Check orientation: REJECT if photo is upside down or significantly rotated (>30°). Photo must be in normal, upright orientation (slight tilts <30° are acceptable)
3. Score zoom (1-10): Higher if face fills 25%+ of frame and is centered. Face should be clearly visible and well-zoomed. REJECT if zoom score <6/10 (too zoomed out)
4. Score visibility (1-10): Higher if unobstructed. REJECT if eyes are closed, or excessive clothing/accessories obscuring the face (hats, masks, hands covering face). CRITICAL: REJECT if hand or any object is covering the nose - the nose must be fully visible and unobstructed
5. Check pose: REJECT if weird/unnatural pose or unnatural expression
6. Decision: "yes" ONLY if ALL conditions met: single face, normal orientation (not upside down or significantly rotated), zoom >=6, visibility >=6, nose fully visible and unobstructed (no hands/objects covering nose), natural pose

Output strict JSON array with index numbers: [{"index": 0, "zoom_score": X, "visibility_score": Y, "total": X+Y, "decision": "yes/no", "explanation": "..."}, ...]. Be strict - reject photos that are upside down, too zoomed out (zoom <6), have multiple people, eyes closed, excessive clothing, hands/objects covering the nose, or weird poses."#;

/// Classifier prompt for a batch of `count` images, numbered from zero.
pub fn classifier_prompt(count: usize) -> String {
    format!(
        "Analyze these {} photos (numbered 0 to {}){}",
        count,
        count.saturating_sub(1),
        CLASSIFIER_CRITERIA
    )
}

/// Substitutes the mutation text into the first placeholder of a template.
///
/// Literal prompts without a placeholder come back unchanged.
pub fn render_anchor_prompt(template: &str, mutation: &str) -> String {
    template.replacen(MUTATION_PLACEHOLDER, mutation, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_template_has_single_placeholder_at_the_end() {
        assert_eq!(ANCHOR_BASE_PROMPT.matches(MUTATION_PLACEHOLDER).count(), 1);
        assert!(ANCHOR_BASE_PROMPT.ends_with("- Change only {mutation}"));
    }

    #[test]
    fn render_anchor_prompt_replaces_placeholder() {
        let mutations = anchor_mutations();
        let prompt = render_anchor_prompt(ANCHOR_BASE_PROMPT, &mutations[0].mutation);
        assert!(!prompt.contains(MUTATION_PLACEHOLDER));
        assert!(prompt.ends_with(
            "- Change only camera rotated 15 degrees left, subject remains centered, eye-level"
        ));
        assert_eq!(render_anchor_prompt("literal prompt", ""), "literal prompt");
    }

    #[test]
    fn catalogs_have_expected_sizes_and_ids() {
        let anchors = anchor_mutations();
        assert_eq!(
            anchors.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
            vec!["angle-left", "angle-right"]
        );
        assert!(anchors.iter().all(|m| m.prompt.is_none()));

        let variants = variant_mutations();
        assert_eq!(
            variants.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
            vec![
                "angle-left",
                "angle-right",
                "light-left",
                "light-right",
                "distance-medium"
            ]
        );
        assert!(variants.iter().all(|m| m
            .prompt
            .as_deref()
            .is_some_and(|p| p.starts_with("Keep the facial features"))));
    }

    #[test]
    fn classifier_prompt_numbers_images_from_zero() {
        let prompt = classifier_prompt(10);
        assert!(prompt.starts_with(
            "Analyze these 10 photos (numbered 0 to 9) for identity cloning suitability."
        ));
        assert!(prompt.contains("zoom >=6, visibility >=6"));
        assert!(prompt.contains("\"index\": 0"));
    }

    #[test]
    fn seedream_prompt_keeps_identity_instruction() {
        assert!(SEEDREAM_PROMPT.starts_with("Reference this image, keeping the same person"));
    }
}
