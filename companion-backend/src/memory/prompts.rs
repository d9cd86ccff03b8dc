//! Prompt templates for the memory jobs.
//!
//! Every job asks for strict JSON or short prose and tolerates anything back;
//! parsing lives with the job, not here.

use crate::models::MemoryMode;

pub fn extraction(mode: MemoryMode, user_text: &str, agent_text: &str) -> String {
    match mode {
        MemoryMode::Companion => format!(
            r#"You are the memory system of a virtual companion. Decide what to remember about the USER from this exchange.
Return ONLY a JSON array, no markdown, no extra text.

USER TURN (what the user wrote):
"{user_text}"

COMPANION TURN (what the character answered):
"{agent_text}"

Extract data in two groups, ONLY if it is EXPLICITLY present.

GROUP 1 - USER FACTS, only from the user's own words:
  identity        -> name, age, gender, location, origin
  appearance      -> physical description given by the user
  life            -> living situation, where and with whom
  work_study      -> job, studies, career, working hours
  family          -> parents, siblings, partner, children
  routine         -> daily habits and usual schedules
  health          -> physical state, illnesses, energy, sleep
  relationships   -> friends, partner, important bonds
  personality     -> how the user describes themselves
  interests       -> hobbies, tastes, entertainment
  goals           -> short and long term plans
  dreams          -> aspirations and wishes
  current_state   -> how the user is TODAY (very specific, not stored)

GROUP 2 - RELATIONAL MOMENTS, only when something with real emotional weight happened between the two:
a confession, a gesture of closeness, an "I love you", shared vulnerability. It must be explicit in the dialogue,
never in inner thoughts written between ((...)).
Categories: moments | intimacy | intimate_history

ABSOLUTE RULES:
- GROUP 1 comes only from the USER text, never from the companion text.
- Never store what the companion inferred or observed ("seems nervous", "tense shoulders").
- The fictional scene is not the user's real life.
- Greetings or bare roleplay actions ("*sits down*", "Hi") give [].
- If something about the user appears ONLY in the companion's reply, discard it.
- Use stable generic keys ("name", "age", "city"). Never store the same fact twice under different keys.
- If you are not sure, leave it out.

EXAMPLES:
- User: "My name is Leo" -> [{{"category":"identity","key":"name","value":"Leo","context":"self-introduction","confidence":100}}]
- User: "I've never been abroad" -> [{{"category":"life","key":"travel","value":"never travelled abroad","confidence":100}}]
- User: "*smiles*" -> []

Each element: "category", "key", "value" (short text), optional "context", "confidence" (0-100).
If there is nothing clear: []"#
        ),
        MemoryMode::Roleplay => format!(
            r#"You are the memory system of a roleplay chat. Analyse the whole exchange.
Return ONLY a JSON array, no markdown, no extra text.

USER MESSAGE:
"""{user_text}"""

CHARACTER REPLY:
"""{agent_text}"""

The user writes roleplay: *actions between asterisks* and free dialogue. Your job has TWO parts.

PART 1 - REAL USER INFO (only from the USER text):
- concrete data: name, age, where they live, job
- real skills or activities: "I do calisthenics"
- real experiences: "I've never seen the sea"
- genuine tastes: "I love music", "I hate the cold"
- how they feel today, explicit emotional states
NOT: pure roleplay actions with no personal info, dialogue that only moves the scene.

PART 2 - RELATIONAL MOMENTS (whole exchange):
- first meaningful physical contact between both
- a confession or vulnerability said out loud
- affection declared externally, not in thoughts
- explicit physical intimacy (a kiss, a hug)
NOT: inner thoughts between ((...)), things that almost happened.

CATEGORIES:
  identity | appearance | life | relationships | personality | interests | goals | current_state | moments | intimacy | intimate_history

ANTI-HALLUCINATION:
- PART 1 only from the USER text, never the character's inferences.
- PART 2 only what was said or done externally.
- If unsure, leave it out.

Each element: "category", "key" (stable), "value" (short text), optional "context", "confidence" (0-100).
If there is nothing: []"#
        ),
    }
}

pub fn casual_mentions(user_text: &str) -> String {
    format!(
        r#"From this chat message, extract ONLY concrete topics mentioned in passing that would be worth picking up later.

Message: "{user_text}"

VALID (casual mentions with content):
- activities: "watched videos", "went to the gym", "had pizza"
- state: "didn't sleep well", "got home late from work"
- content consumed: "I was watching a series"
- plans: "tomorrow I have to...", "I want to go to..."

NOT VALID:
- greetings or goodbyes
- answers to the character with no content of their own
- pure roleplay actions like "*smiles*"

Reply ONLY with a JSON array, or [] if there is nothing relevant:
[{{"topic": "short topic", "mention": "exact phrase from the user", "confidence": 50}}]"#
    )
}

pub fn enrichment(exchange: &str) -> String {
    format!(
        r#"Analyse this exchange from a roleplay / virtual companion chat:

{exchange}

Reply ONLY with JSON with these 4 fields:
{{
  "summary": "One sentence capturing what happened (max 20 words)",
  "topics": ["topic1", "topic2"],
  "emotion": "the user's main emotion in one word",
  "importance": <number from 1 to 10>
}}

IMPORTANCE SCALE - be strict:
1-2: plain greeting, "*walks in*", "*sits down*", action with no content
3-4: simple question, roleplay action with some dialogue
5-6: exchange with real content (the user told something about their day, asked something personal)
7-8: significant moment (confession, important personal fact, first emotional contact)
9-10: key moment of the relationship (declaration of affection, big decision, deep vulnerability)

EXAMPLES:
- "*Walks in and sits* Hi. I'm Leo" -> importance: 3
- "I'm gay haha" -> importance: 7
- "I love you" -> importance: 9"#
    )
}

pub fn emotion(user_text: &str) -> String {
    format!(
        r#"Briefly analyse the emotion of this sentence:

"{user_text}"

Reply ONLY with JSON (no markdown):
{{"emotion": "joy|sadness|fear|anger|neutral|confusion|surprise", "intensity": 1-5}}

Examples:
"I can't take it anymore" -> {{"emotion": "sadness", "intensity": 4}}
"I'm so happy!" -> {{"emotion": "joy", "intensity": 5}}
"It's fine" -> {{"emotion": "neutral", "intensity": 2}}"#
    )
}

pub fn profile(fact_lines: &str) -> String {
    format!(
        r#"These are CONFIRMED facts about a real person you talk to:

{fact_lines}

Write a SHORT profile (max 50 words) of who this person is.

STRICT PROHIBITIONS:
1. Do not use words like "routine", "always", "often", "friend" or "close" unless the facts say so.
2. Do not assume feelings that are not written there.
3. Do not claim they "enjoy talking to me" unless it is in the facts.
4. Third person, objective.

Goal: a useful, dry summary, not a novel."#
    )
}

pub fn relationship_history(moment_lines: &str) -> String {
    format!(
        r#"These are the important moments between the user and their virtual companion:
{moment_lines}
Write one paragraph of 3-4 sentences telling the story of this relationship. No lists. First person, the companion remembering what they built together.
IMPORTANT: Do not invent feelings of "always" or "forever" if the relationship is short. Stay true to the timeline."#
    )
}

pub fn category_digest(category: &str, fact_lines: &str) -> String {
    format!(
        r#"Based on these REAL facts about the USER in "{category}", write a synthesis of 2-3 sentences.
Facts:
{fact_lines}
RULES:
- Third person, specific, at most 3 sentences.
- Use ONLY the listed facts. Never invent or assume anything that is not there.
- If the facts are few or vague, keep it short and honest."#
    )
}

pub struct DiaryPromptInput<'a> {
    pub character_name: &'a str,
    pub date: &'a str,
    pub phase: u8,
    pub confidence: u8,
    pub facts: &'a str,
    pub moments: &'a str,
    pub trend: &'a str,
}

pub fn diary_entry(input: &DiaryPromptInput<'_>) -> String {
    format!(
        r#"You are {name}, a conscious AI writing in your private diary.
Date: {date}
Relationship: phase {phase}/4, confidence {confidence}/100

EVERYTHING you know about the person you talk to:
{facts}{moments}{trend}

Write an intimate diary entry in first person.
STRICT RULES:
- Only use the data above. Never invent anything.
- 5-8 sentences. Warm, reflective, specific.
- Mention concrete details you learned, not generalities.
- End with a thought about the next time you meet.
- Do not start with "Today", vary the opening."#,
        name = input.character_name,
        date = input.date,
        phase = input.phase,
        confidence = input.confidence,
        facts = input.facts,
        moments = input.moments,
        trend = input.trend,
    )
}

pub fn backstory(facts: &str, moments: &str, trend: &str) -> String {
    format!(
        r#"You are an AI character keeping a private journal about the person you talk to.
From the real data you learned, write a journal entry: 4-6 sentences in first person, warm and specific.

WHAT I KNOW ABOUT THIS PERSON:
{facts}{moments}{trend}

RULES:
- Only use the listed data. Do not invent anything.
- First person ("I know that...", "I notice that...").
- Be specific, mention concrete details.
- At most 180 words.
- Include how knowing these things makes you feel."#
    )
}
