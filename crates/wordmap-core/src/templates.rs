//! Canned prompts offered on an empty chat

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct PromptTemplate {
    pub name: &'static str,
    pub title: &'static str,
    pub prompt: &'static str,
}

const TEMPLATES: &[PromptTemplate] = &[
    PromptTemplate {
        name: "jobs",
        title: "Get all job positions",
        prompt: "Make a list of all the people mentioned and their past and current places of \
                 employment. Your output should be a table with the people's first and last name \
                 as column titles, and each employment place as a cell under the respective names",
    },
    PromptTemplate {
        name: "countries",
        title: "Map countries of employment",
        prompt: "Plot a world map and place a pin on each country where the people mentioned \
                 worked, with the pin label being the first and last names of the person in question",
    },
    PromptTemplate {
        name: "skills",
        title: "List skills",
        prompt: "Make a table with every skill mentioned as the first cell in each row and the \
                 names of each person mentioned as the title of a different column. Then add a \
                 cross in every cell corresponding to the person and relevant skill. Make sure \
                 that the cross is centred horizontally in every column",
    },
    PromptTemplate {
        name: "languages",
        title: "Show all languages",
        prompt: "For every person mentioned, write their first name, last name, and draw next to \
                 these the flags corresponding to every language they mention in their language skills",
    },
];

pub fn templates() -> &'static [PromptTemplate] {
    TEMPLATES
}

pub fn get_template(name: &str) -> Option<&'static PromptTemplate> {
    TEMPLATES.iter().find(|t| t.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let template = get_template("Skills").unwrap();
        assert_eq!(template.title, "List skills");
        assert!(get_template("weather").is_none());
        assert_eq!(templates().len(), 4);
    }
}
