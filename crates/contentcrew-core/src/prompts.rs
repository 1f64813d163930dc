//! Prompt templates for each pipeline stage.

pub(crate) fn research(subject: &str) -> String {
    format!(
        "Please research the following topic: {subject}\n\
         Gather relevant information from credible sources about this topic using 'web_search'.\n\
         Provide a summary of your findings, including key points, current trends, and any controversies or debates surrounding the topic.\n\
         After gathering information, please provide a final summary of your research.\n\
         Include the sources used in your research at the end of your report.\n\
         To use the web_search function, you must provide a query string.\n\
         End your research with 'Research complete.' when you've finished the process."
    )
}

pub(crate) const WRITING_STYLES: [&str; 8] = [
    "Standard Article: A well-structured piece with clear sections and a logical flow.",
    "Narrative Style: A story-driven approach that weaves facts into a compelling narrative.",
    "Problem-Solution: An article that presents a challenge and explores potential solutions.",
    "Debate Style: A balanced presentation of different viewpoints on a controversial topic.",
    "How-To Guide: A step-by-step instructional piece on a process or technique.",
    "List Article: A curated list of items, facts, or tips related to the topic.",
    "Interview Format: A Q&A style article presenting expert opinions or experiences.",
    "Case Study: An in-depth analysis of a specific example or scenario related to the topic.",
];

pub(crate) fn draft(category: &str, topic: &str, research_info: &str) -> String {
    let styles = WRITING_STYLES
        .iter()
        .enumerate()
        .map(|(idx, style)| format!("{}. {style}", idx + 1))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Create an engaging and informative article on the following {category} topic: {topic}\n\n\
         Use the research information provided to enrich your content:\n\n\
         {research_info}\n\n\
         First, analyze the topic and choose the most appropriate writing style from the following options:\n\
         {styles}\n\n\
         Once you've selected the most fitting style, craft your article accordingly. Regardless of the chosen style, ensure your article:\n\
         - Begins with a captivating hook or opening that draws the reader in.\n\
         - Provides necessary background information to set the context.\n\
         - Explores current developments, trends, or key aspects of the topic.\n\
         - Discusses potential impacts, implications, or future scenarios related to the subject.\n\
         - Addresses any relevant challenges, controversies, or differing perspectives.\n\
         - Concludes with thought-provoking insights or a call-to-action that resonates with the reader.\n\n\
         Feel free to use subheadings, bullet points, or other formatting elements to enhance readability and engagement.\n\n\
         Tailor your writing style and depth to a {category}-savvy audience, ensuring the content is both informative and compelling.\n\n\
         Before you begin writing, state the chosen writing style and briefly explain why it's the most appropriate for this topic."
    )
}

pub(crate) fn fact_check(article: &str) -> String {
    format!(
        "Please fact-check the following article:\n\n\
         {article}\n\n\
         Provide a summary of your findings, including any discrepancies or inaccuracies found.\n\
         Include the sources used in your fact-checking at the end of your report."
    )
}

pub(crate) fn revision(article: &str, fact_check_report: &str) -> String {
    format!(
        "Please revise the following article based on the fact-check report to correct any inaccuracies:\n\n\
         Original Article:\n{article}\n\n\
         Fact-Check Report:\n{fact_check_report}\n\n\
         Provide a revised version of the article that incorporates the fact-check findings and corrects any inaccuracies.\n\
         Ensure the revised article maintains its original structure, flow, and chosen writing style while improving its accuracy.\n\
         If the original article stated a specific writing style, make sure to preserve that style in your revision."
    )
}

pub(crate) fn feedback_revision(article: &str, feedback: &str) -> String {
    format!(
        "Please revise the following article based on the feedback provided:\n\n\
         Feedback:\n{feedback}\n\n\
         Original Article:\n{article}\n\n\
         Provide a revised version of the article that incorporates the feedback."
    )
}

pub(crate) fn title(topic: &str) -> String {
    format!("Generate a concise and engaging title for an article about {topic}.")
}

pub(crate) fn revised_title(topic: &str) -> String {
    format!("Generate a concise and engaging title for the revised article about {topic}.")
}
