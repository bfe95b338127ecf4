//! Description templates and parameter tables for synthetic shots.

/// Description templates per path tag. Placeholders: `{target}`, `{mood}`,
/// `{modifier}`.
pub(crate) const ORBIT_TEMPLATES: &[&str] = &[
    "环绕{target}的{mood}镜头",
    "围绕{target}旋转的镜头",
    "{mood}的环绕镜头，{modifier}",
    "orbit shot around {target}",
    "{mood} rotating shot around the {target}",
];

pub(crate) const DOLLY_TEMPLATES: &[&str] = &[
    "推进{target}的{mood}镜头",
    "拉远{target}的镜头",
    "缓慢推向{target}",
    "dolly in towards {target}",
    "{mood} push in shot",
];

pub(crate) const CRANE_TEMPLATES: &[&str] = &[
    "升起揭示{target}的镜头",
    "从{target}上方下降的镜头",
    "摇臂升起的{mood}镜头",
    "crane up revealing {target}",
    "{mood} crane shot rising above {target}",
];

pub(crate) const FOLLOW_TEMPLATES: &[&str] = &[
    "跟随{target}移动的镜头",
    "追踪{target}的{mood}镜头",
    "跟拍{target}",
    "follow shot tracking {target}",
    "{mood} following {target}",
];

pub(crate) const LINEAR_TEMPLATES: &[&str] = &[
    "平移拍摄{target}的镜头",
    "横移镜头展示{target}",
    "从左到右的{mood}平移",
    "pan shot across {target}",
    "{mood} sliding shot",
];

pub(crate) fn templates_for(tag: &str) -> &'static [&'static str] {
    match tag {
        "orbit" => ORBIT_TEMPLATES,
        "dolly" => DOLLY_TEMPLATES,
        "crane" => CRANE_TEMPLATES,
        "follow" => FOLLOW_TEMPLATES,
        _ => LINEAR_TEMPLATES,
    }
}

pub(crate) const TARGETS: &[&str] = &[
    "角色", "主角", "英雄", "人物", "物体", "场景", "建筑", "车辆",
    "character", "hero", "protagonist", "object", "scene", "building",
];

pub(crate) const MOODS: &[&str] = &[
    "史诗", "紧张", "温馨", "混乱", "梦幻", "压迫", "轻松", "神秘",
    "epic", "tense", "intimate", "chaotic", "dreamy", "dramatic", "calm",
];

pub(crate) const MODIFIERS: &[&str] = &[
    "从低角度开始",
    "慢慢升起",
    "带有手持感",
    "平稳移动",
    "快速推进",
    "缓慢展开",
    "配合呼吸节奏",
    "starting from low angle",
    "slowly rising",
    "with handheld feel",
    "smooth movement",
    "fast approach",
    "gentle reveal",
];

pub(crate) const DURATIONS: &[f64] = &[2.0, 3.0, 4.0, 5.0, 6.0, 8.0, 10.0, 12.0];
pub(crate) const RADII: &[f64] = &[2.0, 3.0, 4.0, 5.0, 6.0, 8.0];
/// Sorted ascending; the first three seed range starts, the rest range ends.
pub(crate) const HEIGHTS: &[f64] = &[0.3, 0.5, 1.0, 1.5, 2.0, 3.0, 5.0];
pub(crate) const HEIGHT_SPLIT: usize = 3;
pub(crate) const ANGLES: &[f64] = &[90.0, 120.0, 180.0, 270.0, 360.0];
pub(crate) const FOCAL_LENGTHS: &[f64] = &[24.0, 35.0, 50.0, 85.0, 135.0];
pub(crate) const DOLLY_DISTANCES: &[f64] = &[-3.0, -2.0, -1.5, 2.0, 3.0, 4.0];
pub(crate) const FOLLOW_OFFSETS: &[f64] = &[2.0, 3.0, 4.0, 5.0];
pub(crate) const FOLLOW_HEIGHTS: &[f64] = &[1.0, 1.5, 2.0];

/// Below this starting height a description gets a low-angle prefix.
pub(crate) const LOW_ANGLE_THRESHOLD: f64 = 0.5;

/// System prompt for remote generation. `{count}` is the batch size.
pub(crate) const REMOTE_SYSTEM_PROMPT: &str = r#"你是一个电影摄影数据生成助手。
请生成{count}条不同的镜头描述和对应的JSON参数。

输出格式（JSON数组）:
[
    {
        "input": "环绕角色的史诗镜头",
        "output": {
            "shot_name": "Orbit Shot",
            "duration": 6,
            "path": {"type": "orbit", "radius": 4, "angle": 180},
            "constraint": {"type": "look_at", "target": "$SELECTED"},
            "modifiers": [{"type": "handheld", "intensity": 0.2}],
            "lens": {"focal_length": 35}
        }
    },
    ...
]

要求:
1. 描述要多样化（中英文混合）
2. 参数要合理
3. path.type 可以是: orbit, dolly, crane, follow, linear
4. constraint.type 可以是: look_at, fixed
5. modifiers 的 type 可以是: handheld, shake，intensity 在 0 到 1 之间
6. 每条描述都要独特"#;

pub(crate) fn remote_system_prompt(count: usize) -> String {
    REMOTE_SYSTEM_PROMPT.replace("{count}", &count.to_string())
}

pub(crate) fn remote_user_prompt(batch: usize, count: usize, mood: &str, target: &str) -> String {
    format!("请生成第 {batch} 批数据（{count}条），确保与之前的不重复。主题提示：{mood} {target}")
}

/// Fill a description template.
pub(crate) fn render(template: &str, target: &str, mood: &str, modifier: &str) -> String {
    template
        .replace("{target}", target)
        .replace("{mood}", mood)
        .replace("{modifier}", modifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shot_schema::CameraPath;

    #[test]
    fn test_every_path_tag_has_templates() {
        for tag in CameraPath::TAGS {
            assert_eq!(templates_for(tag).len(), 5, "templates for {tag}");
        }
    }

    #[test]
    fn test_render_fills_all_placeholders() {
        for tag in CameraPath::TAGS {
            for template in templates_for(tag) {
                let text = render(template, "角色", "史诗", "慢慢升起");
                assert!(!text.contains('{'), "unfilled placeholder in {text}");
            }
        }
    }

    #[test]
    fn test_height_tables_split_low_and_high() {
        let (low, high) = HEIGHTS.split_at(HEIGHT_SPLIT);
        assert!(low.iter().all(|h| high.iter().all(|g| h < g)));
    }

    #[test]
    fn test_remote_prompts() {
        let system = remote_system_prompt(5);
        assert!(system.contains("请生成5条"));
        assert!(system.contains("orbit, dolly, crane, follow, linear"));

        let user = remote_user_prompt(2, 5, "史诗", "角色");
        assert_eq!(
            user,
            "请生成第 2 批数据（5条），确保与之前的不重复。主题提示：史诗 角色"
        );
    }
}
