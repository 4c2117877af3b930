//! Built-in node type catalog.
//!
//! These definitions describe the node palette the visual editor ships with:
//! AI processing, data transforms, triggers, integrations, logic, messaging,
//! and web scraping. Registration order is irrelevant; categories carry an
//! explicit display order.

use serde_json::json;

use super::{ConfigFieldSpec, NodeCategory, NodeTypeDefinition, NodeTypeRegistry, PortSpec};

pub(super) fn install(registry: &mut NodeTypeRegistry) {
    install_categories(registry);
    install_ai_types(registry);
    install_data_types(registry);
    install_trigger_types(registry);
    install_integration_types(registry);
    install_logic_types(registry);
    install_communication_types(registry);
    install_web_scraping_types(registry);
}

fn install_categories(registry: &mut NodeTypeRegistry) {
    registry.register_category(NodeCategory::new(
        "ai_models",
        "AI Models",
        "Large Language Models and AI processing nodes",
        1,
    ));
    registry.register_category(NodeCategory::new(
        "data_processing",
        "Data Processing",
        "Transform, filter, and manipulate data",
        2,
    ));
    registry.register_category(NodeCategory::new(
        "triggers",
        "Triggers",
        "Events that start workflow execution",
        3,
    ));
    registry.register_category(NodeCategory::new(
        "integrations",
        "Integrations",
        "Connect to external services and APIs",
        4,
    ));
    registry.register_category(NodeCategory::new(
        "logic",
        "Logic & Control",
        "Conditional logic and flow control",
        5,
    ));
    registry.register_category(NodeCategory::new(
        "communications",
        "Communications",
        "Email, messaging, and notifications",
        6,
    ));
    registry.register_category(NodeCategory::new(
        "web_scraping",
        "Web Scraping",
        "Extract and process content from websites",
        7,
    ));
}

fn install_ai_types(registry: &mut NodeTypeRegistry) {
    registry.register_type(
        NodeTypeDefinition::new(
            "ai_model",
            "AI Model",
            "Process text using a Large Language Model",
            "ai_models",
        )
        .with_input(PortSpec::new("prompt", "Prompt", "string").required())
        .with_input(PortSpec::new("context", "Context", "string"))
        .with_output(PortSpec::new("response", "Response", "string"))
        .with_output(PortSpec::new("tokens_used", "Tokens Used", "number"))
        .with_config_field(
            ConfigFieldSpec::new("provider", "select", "AI Provider")
                .required()
                .with_default(json!("openai"))
                .with_options(["openai", "anthropic", "google", "mistral", "local"]),
        )
        .with_config_field(
            ConfigFieldSpec::new("model", "select", "Model")
                .required()
                .with_default(json!("gpt-4")),
        )
        .with_config_field(
            ConfigFieldSpec::new("temperature", "number", "Temperature").with_default(json!(0.7)),
        )
        .with_config_field(
            ConfigFieldSpec::new("max_tokens", "number", "Max Tokens").with_default(json!(1000)),
        )
        .with_config_field(ConfigFieldSpec::new("prompt", "string", "Prompt Template"))
        .with_tags(["ai", "llm", "text-processing"]),
    );

    registry.register_type(
        NodeTypeDefinition::new(
            "text_analysis",
            "Text Analysis",
            "Analyze text for sentiment, entities, and keywords",
            "ai_models",
        )
        .with_input(PortSpec::new("text", "Text", "string").required())
        .with_output(PortSpec::new("sentiment", "Sentiment", "object"))
        .with_output(PortSpec::new("entities", "Entities", "array"))
        .with_output(PortSpec::new("keywords", "Keywords", "array"))
        .with_config_field(
            ConfigFieldSpec::new("analysis_type", "select", "Analysis Type")
                .required()
                .with_default(json!("all"))
                .with_options(["sentiment", "entities", "keywords", "all"]),
        )
        .with_tags(["ai", "text", "analysis", "nlp"]),
    );
}

fn install_data_types(registry: &mut NodeTypeRegistry) {
    registry.register_type(
        NodeTypeDefinition::new(
            "data_transform",
            "Data Transform",
            "Transform, filter, and manipulate data",
            "data_processing",
        )
        .with_input(PortSpec::new("data", "Data", "any").required())
        .with_output(PortSpec::new("transformed_data", "Transformed Data", "any"))
        .with_config_field(
            ConfigFieldSpec::new("operation", "select", "Operation")
                .required()
                .with_default(json!("filter"))
                .with_options(["filter", "map", "reduce", "sort", "group", "join"]),
        )
        .with_config_field(ConfigFieldSpec::new("expression", "string", "Expression").required())
        .with_tags(["data", "transform", "filter"]),
    );

    registry.register_type(
        NodeTypeDefinition::new(
            "data_formatter",
            "Data Formatter",
            "Format and structure output data",
            "data_processing",
        )
        .with_input(PortSpec::new("summary_data", "Summary Data", "object").required())
        .with_output(PortSpec::new("formatted_output", "Formatted Output", "object"))
        .with_config_field(
            ConfigFieldSpec::new("output_format", "select", "Output Format")
                .required()
                .with_default(json!("structured"))
                .with_options(["structured", "markdown", "html", "plain_text"]),
        )
        .with_config_field(
            ConfigFieldSpec::new("include_metadata", "boolean", "Include Metadata")
                .with_default(json!(true)),
        )
        .with_tags(["formatting", "output", "structure", "data"]),
    );

    registry.register_type(
        NodeTypeDefinition::new(
            "data_logger",
            "Data Logger",
            "Record run metrics to an analytics destination",
            "data_processing",
        )
        .with_input(PortSpec::new("data", "Data", "any"))
        .with_output(PortSpec::new("logged", "Logged", "object"))
        .with_config_field(
            ConfigFieldSpec::new("log_destination", "string", "Destination")
                .with_default(json!("analytics_db")),
        )
        .with_config_field(ConfigFieldSpec::new("metrics", "json", "Metrics"))
        .with_tags(["data", "logging", "metrics"])
        .non_critical(),
    );
}

fn install_trigger_types(registry: &mut NodeTypeRegistry) {
    registry.register_type(
        NodeTypeDefinition::new(
            "webhook_trigger",
            "Webhook Trigger",
            "Start workflow when an HTTP webhook is called",
            "triggers",
        )
        .with_output(PortSpec::new("payload", "Payload", "object"))
        .with_output(PortSpec::new("headers", "Headers", "object"))
        .with_config_field(
            ConfigFieldSpec::new("method", "select", "HTTP Method")
                .required()
                .with_default(json!("POST"))
                .with_options(["GET", "POST", "PUT", "DELETE", "PATCH"]),
        )
        .with_config_field(ConfigFieldSpec::new("path", "string", "Webhook Path"))
        .with_tags(["trigger", "webhook", "http"]),
    );

    registry.register_type(
        NodeTypeDefinition::new(
            "schedule_trigger",
            "Schedule Trigger",
            "Start workflow on a schedule",
            "triggers",
        )
        .with_output(PortSpec::new("timestamp", "Timestamp", "string"))
        .with_output(PortSpec::new("schedule_info", "Schedule Info", "object"))
        .with_config_field(
            ConfigFieldSpec::new("schedule_type", "select", "Schedule Type")
                .required()
                .with_default(json!("interval"))
                .with_options(["interval", "cron", "once"]),
        )
        .with_config_field(
            ConfigFieldSpec::new("cron_expression", "string", "Cron Expression")
                .with_default(json!("0 0 * * *")),
        )
        .with_tags(["trigger", "schedule", "cron", "timer"]),
    );

    registry.register_type(
        NodeTypeDefinition::new(
            "email_trigger",
            "Email Trigger",
            "Start workflow when a new email arrives",
            "triggers",
        )
        .with_output(PortSpec::new("email_data", "Email Data", "object"))
        .with_config_field(ConfigFieldSpec::new("mailbox", "string", "Mailbox"))
        .with_tags(["trigger", "email"]),
    );
}

fn install_integration_types(registry: &mut NodeTypeRegistry) {
    registry.register_type(
        NodeTypeDefinition::new(
            "http_request",
            "HTTP Request",
            "Make HTTP requests to external APIs and services",
            "integrations",
        )
        .with_input(PortSpec::new("url", "URL", "string").required())
        .with_input(PortSpec::new("body", "Body", "any"))
        .with_output(PortSpec::new("response", "Response", "object"))
        .with_output(PortSpec::new("status_code", "Status Code", "number"))
        .with_config_field(
            ConfigFieldSpec::new("method", "select", "HTTP Method")
                .required()
                .with_default(json!("GET"))
                .with_options(["GET", "POST", "PUT", "DELETE", "PATCH"]),
        )
        .with_config_field(ConfigFieldSpec::new("headers", "json", "Headers"))
        .with_config_field(
            ConfigFieldSpec::new("timeout", "number", "Timeout (seconds)").with_default(json!(30)),
        )
        .with_tags(["integration", "http", "api", "request"]),
    );
}

fn install_logic_types(registry: &mut NodeTypeRegistry) {
    registry.register_type(
        NodeTypeDefinition::new(
            "condition",
            "Condition",
            "Route workflow based on conditions",
            "logic",
        )
        .with_input(PortSpec::new("value", "Value", "any").required())
        .with_output(PortSpec::new("true", "True", "any"))
        .with_output(PortSpec::new("false", "False", "any"))
        .with_config_field(
            ConfigFieldSpec::new("operator", "select", "Operator")
                .required()
                .with_default(json!("equals"))
                .with_options([
                    "equals",
                    "not_equals",
                    "greater_than",
                    "less_than",
                    "contains",
                    "starts_with",
                    "ends_with",
                ]),
        )
        .with_config_field(
            ConfigFieldSpec::new("compare_value", "string", "Compare Value").required(),
        )
        .with_tags(["logic", "condition", "branch", "if"]),
    );

    registry.register_type(
        NodeTypeDefinition::new(
            "approval",
            "Approval",
            "Hold for human review before continuing",
            "logic",
        )
        .with_input(PortSpec::new("item", "Item", "any"))
        .with_output(PortSpec::new("approval_status", "Approval Status", "string"))
        .with_config_field(ConfigFieldSpec::new("reviewers", "json", "Reviewers"))
        .with_config_field(
            ConfigFieldSpec::new("escalation_timeout", "number", "Escalation Timeout (minutes)")
                .with_default(json!(240)),
        )
        .with_tags(["logic", "approval", "review"]),
    );
}

fn install_communication_types(registry: &mut NodeTypeRegistry) {
    registry.register_type(
        NodeTypeDefinition::new(
            "notification",
            "Notification",
            "Send a notification to a channel",
            "communications",
        )
        .with_input(PortSpec::new("message", "Message", "string"))
        .with_output(PortSpec::new("notification_sent", "Sent", "boolean"))
        .with_config_field(
            ConfigFieldSpec::new("notification_type", "select", "Type")
                .with_default(json!("email"))
                .with_options(["email", "slack", "sms", "webhook"]),
        )
        .with_config_field(
            ConfigFieldSpec::new("channel", "string", "Channel").with_default(json!("default")),
        )
        .with_tags(["communications", "notify"])
        .non_critical(),
    );

    registry.register_type(
        NodeTypeDefinition::new(
            "email_sender",
            "Email Sender",
            "Send an email message",
            "communications",
        )
        .with_input(PortSpec::new("body", "Body", "string").required())
        .with_input(PortSpec::new("recipient", "Recipient", "string"))
        .with_output(PortSpec::new("message_id", "Message Id", "string"))
        .with_output(PortSpec::new("delivery_status", "Delivery Status", "string"))
        .with_config_field(
            ConfigFieldSpec::new("from_address", "string", "From Address")
                .with_default(json!("support@company.com")),
        )
        .with_tags(["communications", "email", "send"]),
    );
}

fn install_web_scraping_types(registry: &mut NodeTypeRegistry) {
    registry.register_type(
        NodeTypeDefinition::new(
            "url_input",
            "URL Input",
            "Provide a website URL for scraping",
            "web_scraping",
        )
        .with_output(PortSpec::new("url", "URL", "string"))
        .with_config_field(
            ConfigFieldSpec::new("url", "url", "Website URL")
                .required()
                .with_default(json!("https://example.com")),
        )
        .with_tags(["input", "url", "web", "scraping"]),
    );

    registry.register_type(
        NodeTypeDefinition::new(
            "web_scraper",
            "Web Scraper",
            "Extract content from web pages",
            "web_scraping",
        )
        .with_input(PortSpec::new("target_url", "Target URL", "string").required())
        .with_output(PortSpec::new("content", "Scraped Content", "string"))
        .with_output(PortSpec::new("metadata", "Page Metadata", "object"))
        .with_output(PortSpec::new("source_url", "Source URL", "string"))
        .with_config_field(
            ConfigFieldSpec::new("extract_text_only", "boolean", "Text Only")
                .with_default(json!(true)),
        )
        .with_config_field(
            ConfigFieldSpec::new("max_content_length", "number", "Max Content Length")
                .with_default(json!(10_000)),
        )
        .with_config_field(
            ConfigFieldSpec::new("timeout", "number", "Timeout (seconds)").with_default(json!(30)),
        )
        .with_tags(["scraping", "web", "content", "extraction"]),
    );
}
