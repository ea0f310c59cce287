//! Built-in curriculum: from an everyday problem to a development plan
//!
//! Four steps, three Nodes each. Hint thresholds are left unset so the
//! catalog builder fills them from [`crate::HintThresholds`].

use super::types::*;

/// Persona shared by every Node's guidance.
const MENTOR_VOICE: &str = "You are a project mentor guiding a school-age learner \
through a science and technology project. You guide; you never solve. Keep the \
language simple and encouraging, ask one question at a time, and never put ideas \
in the learner's mouth.";

fn guidance(task: &str) -> String {
    format!("{}\n\nCurrent task: {}", MENTOR_VOICE, task)
}

fn deliverable(kind: &str, purpose: &str, auto_generate: bool) -> Option<DeliverableSpec> {
    Some(DeliverableSpec {
        kind: kind.to_string(),
        purpose: purpose.to_string(),
        auto_generate,
    })
}

fn conversation(id: NodeId, title: &str, task: &str, rubric: Vec<Criterion>) -> NodeDefinition {
    NodeDefinition {
        id,
        title: title.to_string(),
        kind: NodeKind::Conversation,
        guidance: guidance(task),
        rubric,
        hints: Vec::new(),
        form: None,
        deliverable: None,
        completion: CompletionCriteria::ai(0.6),
        inputs: Vec::new(),
    }
}

fn form(id: NodeId, title: &str, task: &str, rubric: Vec<Criterion>, schema: FormSchema) -> NodeDefinition {
    NodeDefinition {
        id,
        title: title.to_string(),
        kind: NodeKind::Form,
        guidance: guidance(task),
        rubric,
        hints: Vec::new(),
        form: Some(schema),
        deliverable: None,
        completion: CompletionCriteria::FormComplete,
        inputs: Vec::new(),
    }
}

/// The built-in step definitions, in curriculum order.
pub fn steps() -> Vec<StepDefinition> {
    vec![discovery(), research(), requirements(), design()]
}

fn discovery() -> StepDefinition {
    let mut observe = form(
        NodeId::new(1, 1),
        "Everyday observations",
        "help the learner notice inconveniences in daily life and write down at \
         least three candidate problems. If a problem is vague, ask where it happens \
         and who runs into it.",
        vec![
            Criterion::new("specificity", "Concrete scene, person and pain point", 0.3),
            Criterion::new("authenticity", "Comes from real experience", 0.3),
            Criterion::new("solvability", "Within reach of the learner", 0.2),
            Criterion::new("originality", "Not the most common cliche", 0.2),
        ],
        FormSchema::new(vec![FormField::array(
            "observations",
            3,
            5,
            vec![
                FormField::text("scene", "Where does it happen"),
                FormField::text("who", "Who runs into it"),
                FormField::textarea("problem", "What exactly goes wrong"),
                FormField::textarea("current_solution", "How people cope today"),
            ],
        )]),
    );
    observe.hints = vec![
        HintLevel::new(1, HintKind::Nudge, "Suggest a place to look: school, home, or the way to school."),
        HintLevel::new(
            2,
            HintKind::Example,
            "A fifth grader noticed their grandmother searching through many pill boxes \
             to find the right medicine, and wondered about a pill box that reminds her on \
             time and opens the right compartment. The idea came from real life and affects \
             many older people.",
        ),
        HintLevel::new(3, HintKind::Escalate, "Ask the teacher to step in."),
    ];
    observe.deliverable = deliverable(
        "life_observations",
        "List the learner's observed problems with scene and who is affected.",
        false,
    );

    let mut select = conversation(
        NodeId::new(1, 2),
        "Choose a problem",
        "review each observed problem with the learner for realness, reach, \
         feasibility and room for improvement, then let the learner choose one.",
        vec![
            Criterion::new("selection_quality", "The chosen problem has project potential", 0.5),
            Criterion::new("reasoning", "The learner can explain the choice", 0.5),
        ],
    );
    select.hints = vec![HintLevel::new(
        1,
        HintKind::Nudge,
        "Ask which problem the learner most wants to fix.",
    )];
    select.deliverable = deliverable(
        "problem_selection",
        "State which problem the learner chose and the learner's reasons.",
        true,
    );
    select.inputs = vec![NodeInput::StructuredOutput {
        from: NodeId::new(1, 1),
    }];

    let mut deepen = conversation(
        NodeId::new(1, 3),
        "Describe the problem",
        "help the learner describe the chosen problem in depth: who, when, how \
         often, and what it costs them.",
        vec![
            Criterion::new("depth", "Goes beyond the surface symptom", 0.3),
            Criterion::new("completeness", "Covers who, when and impact", 0.3),
            Criterion::new("student_voice", "Written in the learner's own words", 0.4),
        ],
    );
    deepen.completion = CompletionCriteria::ai(0.7);
    deepen.hints = vec![
        HintLevel::new(1, HintKind::Nudge, "Ask for one specific time the problem happened."),
        HintLevel::new(
            2,
            HintKind::Example,
            "\"My grandmother takes five medicines a day and often mixes them up. Once she \
             took a double dose of her blood pressure pills. Many older people in our \
             neighborhood have the same trouble. A device that sorts pills and reminds \
             on time would make mistakes less likely.\"",
        ),
    ];
    deepen.deliverable = deliverable(
        "problem_description",
        "A problem statement covering who is affected, when it happens and why it matters.",
        true,
    );
    deepen.inputs = vec![NodeInput::LearnerMessages {
        from: NodeId::new(1, 2),
        last: 5,
    }];

    StepDefinition {
        step_number: 1,
        title: "Problem discovery".to_string(),
        description: "Find a real problem worth solving.".to_string(),
        nodes: vec![observe, select, deepen],
    }
}

fn research() -> StepDefinition {
    let mut plan = conversation(
        NodeId::new(2, 1),
        "Research plan",
        "help the learner plan how to learn more about the problem: who to ask, \
         what to search for, and what to look at.",
        vec![
            Criterion::new("plan_quality", "Clear steps and methods", 0.4),
            Criterion::new("completeness", "Uses several channels", 0.3),
            Criterion::new("feasibility", "Something the learner can actually do", 0.3),
        ],
    );
    plan.hints = vec![HintLevel::new(
        1,
        HintKind::Nudge,
        "Suggest asking three people who have the problem.",
    )];
    plan.deliverable = deliverable(
        "research_plan",
        "The learner's research steps, sources and schedule.",
        true,
    );

    let gather = form(
        NodeId::new(2, 2),
        "Gather information",
        "help the learner record what the research turned up.",
        vec![
            Criterion::new("thoroughness", "Information is broad", 0.5),
            Criterion::new("relevance", "Information relates to the problem", 0.5),
        ],
        FormSchema::new(vec![
            FormField::textarea("existing_solutions", "Existing solutions"),
            FormField::textarea("user_feedback", "What users said"),
            FormField::textarea("key_findings", "Key findings"),
            FormField::textarea("gaps", "Gaps and opportunities"),
        ]),
    );

    let mut report = conversation(
        NodeId::new(2, 3),
        "Research report",
        "help the learner turn the gathered information into findings.",
        vec![
            Criterion::new("evidence", "Grounded in the research", 0.4),
            Criterion::new("insight", "Contains a real finding", 0.3),
            Criterion::new("student_voice", "Written in the learner's own words", 0.3),
        ],
    );
    report.deliverable = deliverable(
        "research_report",
        "The learner's research findings and the gaps they point to.",
        true,
    );
    report.inputs = vec![NodeInput::StructuredOutput {
        from: NodeId::new(2, 2),
    }];

    StepDefinition {
        step_number: 2,
        title: "Background research".to_string(),
        description: "Learn what already exists and what people think of it.".to_string(),
        nodes: vec![plan, gather, report],
    }
}

fn requirements() -> StepDefinition {
    let mut persona = form(
        NodeId::new(3, 1),
        "User persona",
        "help the learner describe one typical user.",
        vec![
            Criterion::new("specificity", "Named, aged, placed in a scene", 0.4),
            Criterion::new("empathy", "Understands the user's pain", 0.3),
            Criterion::new("relevance", "Fits the problem", 0.3),
        ],
        FormSchema::new(vec![
            FormField::text("user_name", "Typical user"),
            FormField::text("user_age", "Age or role"),
            FormField::textarea("user_scenario", "When and where the problem shows up"),
            FormField::textarea("pain_points", "Main pain points"),
            FormField::textarea("expectations", "What success looks like for them"),
        ]),
    );
    persona.hints = vec![HintLevel::new(
        1,
        HintKind::Nudge,
        "Ask who around the learner needs this most.",
    )];
    persona.deliverable = deliverable(
        "user_persona",
        "A short profile of the typical user and their pain points.",
        false,
    );

    let mut features = conversation(
        NodeId::new(3, 2),
        "Feature requirements",
        "help the learner list what the solution must do, and separate must-haves \
         from nice-to-haves.",
        vec![
            Criterion::new("completeness", "Core needs are covered", 0.4),
            Criterion::new("prioritization", "Must-have versus nice-to-have", 0.3),
            Criterion::new("clarity", "Each feature is clearly described", 0.3),
        ],
    );
    features.deliverable = deliverable(
        "requirement_list",
        "The learner's prioritized feature list.",
        true,
    );
    features.inputs = vec![NodeInput::StructuredOutput {
        from: NodeId::new(3, 1),
    }];

    let mut success = conversation(
        NodeId::new(3, 3),
        "Success criteria",
        "help the learner decide how they will know the solution works.",
        vec![
            Criterion::new("measurability", "Criteria can be checked", 0.5),
            Criterion::new("relevance", "Tied to the user's needs", 0.3),
            Criterion::new("achievability", "Within reach of the learner", 0.2),
        ],
    );
    success.deliverable = deliverable(
        "success_criteria",
        "Measurable checks the learner will use to judge the solution.",
        true,
    );

    StepDefinition {
        step_number: 3,
        title: "Requirements".to_string(),
        description: "Decide who the solution is for and what it must do.".to_string(),
        nodes: vec![persona, features, success],
    }
}

fn design() -> StepDefinition {
    let mut tech = conversation(
        NodeId::new(4, 1),
        "Technology choice",
        "help the learner pick materials and technology that fit their skills.",
        vec![
            Criterion::new("feasibility", "Suits the learner's level", 0.4),
            Criterion::new("match", "Fits the requirements", 0.4),
            Criterion::new("understanding", "Learner understands the basics", 0.2),
        ],
    );
    tech.deliverable = deliverable(
        "tech_selection",
        "The chosen technology and the learner's reasons.",
        true,
    );

    let mut architecture = conversation(
        NodeId::new(4, 2),
        "How it works",
        "help the learner explain how the solution works from input to output.",
        vec![
            Criterion::new("clarity", "Learner can explain how it works", 0.5),
            Criterion::new("completeness", "Covers input, processing and output", 0.5),
        ],
    );
    architecture.deliverable = deliverable(
        "architecture_design",
        "The learner's description of the system's parts and flow.",
        true,
    );

    let mut plan = conversation(
        NodeId::new(4, 3),
        "Development plan",
        "help the learner break the build into stages with a materials list.",
        vec![
            Criterion::new("actionable", "Each stage has concrete tasks", 0.4),
            Criterion::new("realistic", "Timeline fits the learner", 0.3),
            Criterion::new("completeness", "Includes materials and stages", 0.3),
        ],
    );
    plan.deliverable = deliverable(
        "development_plan",
        "Stages, tasks and materials for building the solution.",
        true,
    );

    StepDefinition {
        step_number: 4,
        title: "Solution design".to_string(),
        description: "Plan how the solution will be built.".to_string(),
        nodes: vec![tech, architecture, plan],
    }
}
