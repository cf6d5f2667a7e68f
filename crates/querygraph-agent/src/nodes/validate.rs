use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{info, warn};

use querygraph_core::error::Result;
use querygraph_core::traits::Reasoner;

use crate::context::{QueryContext, NO_QUERY_EXPLANATION, NO_QUERY_THINKING, NO_QUERY_USED};
use crate::graph::{Label, Node};
use crate::reply::{parse_structured_reply, Validation};

#[derive(Debug, Clone, PartialEq)]
pub struct ValidateInput {
    pub question: String,
    pub query_used: String,
    pub query_thinking: String,
    pub query_explanation: String,
    pub query_result: String,
}

/// Judges whether the last result answers the question.
///
/// A negative verdict may carry a refined question, which replaces the
/// working question for the next decision.
pub struct ValidateNode {
    reasoner: Arc<dyn Reasoner>,
}

impl ValidateNode {
    pub fn new(reasoner: Arc<dyn Reasoner>) -> Self {
        Self { reasoner }
    }
}

fn validate_prompt(input: &ValidateInput) -> String {
    format!(
        r#"
### ROLE
You are a data analyst that checks the responses of the query against the question being asked.

### CONTEXT
#### QUESTION
{question}

#### QUERY USED
{query_used}

#### QUERY THINKING
{query_thinking}

#### QUERY EXPLANATION
{query_explanation}

#### QUERY RESULT
{query_result}

### TASK
Decide whether the query result correctly and completely answers the question.
If it does not, rewrite the question so the next attempt can do better: name the
tables, filters or aggregations that are missing.

### OUTPUT FORMAT
Return your response in this exact YAML format:

```yaml
isDataCorrect: <true or false>
refinedQuestion: |
    <a refined question, or empty when the data is correct>
```"#,
        question = input.question,
        query_used = input.query_used,
        query_thinking = input.query_thinking,
        query_explanation = input.query_explanation,
        query_result = input.query_result,
    )
}

impl Node<QueryContext> for ValidateNode {
    type Prepared = ValidateInput;
    type Output = Validation;

    fn name(&self) -> &str {
        super::VALIDATE
    }

    fn prepare(&self, ctx: &QueryContext) -> ValidateInput {
        ValidateInput {
            question: ctx.question_or_default().to_string(),
            query_used: ctx.query_used.as_deref().unwrap_or(NO_QUERY_USED).to_string(),
            query_thinking: ctx
                .query_thinking
                .as_deref()
                .unwrap_or(NO_QUERY_THINKING)
                .to_string(),
            query_explanation: ctx
                .query_explanation
                .as_deref()
                .unwrap_or(NO_QUERY_EXPLANATION)
                .to_string(),
            query_result: ctx.query_result_text(),
        }
    }

    fn execute<'a>(&'a self, input: &'a ValidateInput) -> BoxFuture<'a, Result<Validation>> {
        Box::pin(async move {
            let reply = self.reasoner.generate(vec![validate_prompt(input)]).await?;
            Ok(match parse_structured_reply::<Validation>(&reply) {
                Ok(validation) => validation,
                Err(e) => {
                    warn!(error = %e, "Could not parse validation reply");
                    Validation::degraded(&e)
                }
            })
        })
    }

    fn finalize(&self, ctx: &mut QueryContext, _input: ValidateInput, validation: Validation) -> Label {
        info!(correct = validation.is_data_correct, "Result validated");
        ctx.is_data_correct = Some(validation.is_data_correct);
        if let Some(refined) = validation.refined_question.filter(|q| !q.is_empty()) {
            info!(question = %refined, "Question refined");
            ctx.question = Some(refined);
        }
        Label::from(super::TO_DECIDE)
    }
}
