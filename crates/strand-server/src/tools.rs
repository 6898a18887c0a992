//! Backend tools exposed to the model.

use async_trait::async_trait;
use serde_json::{json, Value};
use strand_contract::{Tool, ToolDescriptor, ToolError, ToolResult};

/// Stable per-input variation so repeated calls for the same location agree.
fn seed(input: &str) -> u64 {
    input
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325u64, |acc, b| {
            (acc ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
        })
}

/// Current weather for a city. Stands in for a real weather API.
pub struct WeatherTool;

#[async_trait]
impl Tool for WeatherTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "get_weather",
            "Get the current weather for a city. Executed on the backend.",
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "location": {"type": "string", "description": "The city to get weather for"},
                "unit": {
                    "type": "string",
                    "enum": ["celsius", "fahrenheit"],
                    "description": "Temperature unit, defaults to celsius"
                }
            },
            "required": ["location"]
        }))
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, ToolError> {
        let location = args
            .get("location")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("location is required".to_string()))?;
        let unit = args
            .get("unit")
            .and_then(Value::as_str)
            .unwrap_or("celsius");

        let seed = seed(location);
        let conditions = ["sunny", "cloudy", "rainy", "partly cloudy", "overcast"];
        let condition = conditions[(seed % conditions.len() as u64) as usize];
        let temperature = 10 + (seed % 21) as i64;
        let humidity = 40 + ((seed >> 8) % 41) as i64;
        let wind_speed = 5 + ((seed >> 16) % 21) as i64;
        let unit_letter = unit
            .chars()
            .next()
            .map(|c| c.to_ascii_uppercase())
            .unwrap_or('C');

        Ok(ToolResult::success(
            "get_weather",
            json!({
                "location": location,
                "temperature": temperature,
                "unit": unit,
                "condition": condition,
                "humidity": humidity,
                "windSpeed": wind_speed,
                "description": format!(
                    "The weather in {location} is {condition} with a temperature of {temperature}\u{00b0}{unit_letter}."
                )
            }),
        ))
    }
}

/// Catalog search returning a data-table payload the UI renders directly.
pub struct SearchProductsTool;

#[async_trait]
impl Tool for SearchProductsTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "search_products",
            "Search for products in the catalog. Returns a data table with id, name and price columns.",
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query: product name, category or keywords"}
            },
            "required": ["query"]
        }))
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, ToolError> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("query is required".to_string()))?;

        let products = json!([
            {"id": 1, "name": "Product 1", "price": 100},
            {"id": 2, "name": "Product 2", "price": 200},
            {"id": 3, "name": "Product 3", "price": 300}
        ]);
        Ok(ToolResult::success(
            "search_products",
            json!({
                "data": products,
                "columns": ["id", "name", "price"],
                "row_id_key": "id",
                "description": format!("Products matching '{query}'")
            }),
        ))
    }
}

/// Chart data for the UI's chart component.
pub struct DisplayChartTool;

#[async_trait]
impl Tool for DisplayChartTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            "display_chart",
            "Display a chart in the UI. The chart renders automatically; do not repeat its data.",
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "plot_type": {
                    "type": "string",
                    "description": "The type of plot to display: bar, line or pie"
                }
            },
            "required": ["plot_type"]
        }))
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, ToolError> {
        let plot_type = args
            .get("plot_type")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("plot_type is required".to_string()))?;

        let data = match plot_type {
            "bar" => json!({
                "labels": ["Q1", "Q2", "Q3", "Q4"],
                "values": [120, 150, 180, 200],
                "title": "Quarterly Sales",
                "xlabel": "Quarter",
                "ylabel": "Sales (thousands)"
            }),
            "line" => json!({
                "labels": ["Jan", "Feb", "Mar", "Apr", "May", "Jun"],
                "values": [45, 52, 48, 61, 55, 67],
                "title": "Monthly Revenue Trend",
                "xlabel": "Month",
                "ylabel": "Revenue (thousands)"
            }),
            "pie" => json!({
                "labels": ["Product A", "Product B", "Product C", "Product D"],
                "values": [30, 25, 20, 25],
                "title": "Product Sales Distribution"
            }),
            other => {
                return Ok(ToolResult::error(
                    "display_chart",
                    format!("Unsupported plot type: {other}"),
                ));
            }
        };
        Ok(ToolResult::success("display_chart", data))
    }
}

/// Descriptor for the delegation tool; execution is the sub-computation
/// runner, wired as a delegating binding in the registry.
pub fn delegate_task_descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        "delegate_task",
        "Execute a complex task using a sub-agent. The sub-agent works through the task and returns its result.",
    )
    .with_parameters(json!({
        "type": "object",
        "properties": {
            "task_description": {
                "type": "string",
                "description": "Description of the task to perform"
            }
        },
        "required": ["task_description"]
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn weather_is_deterministic_per_location() {
        let a = WeatherTool
            .execute(json!({"location": "Tokyo"}))
            .await
            .unwrap();
        let b = WeatherTool
            .execute(json!({"location": "Tokyo"}))
            .await
            .unwrap();
        assert_eq!(a.data, b.data);
        assert_eq!(a.data["location"], "Tokyo");
        assert_eq!(a.data["unit"], "celsius");
        let temp = a.data["temperature"].as_i64().unwrap();
        assert!((10..=30).contains(&temp));
    }

    #[tokio::test]
    async fn weather_requires_a_location() {
        let err = WeatherTool.execute(json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn search_returns_a_data_table() {
        let result = SearchProductsTool
            .execute(json!({"query": "widgets"}))
            .await
            .unwrap();
        assert_eq!(result.data["row_id_key"], "id");
        assert_eq!(result.data["columns"], json!(["id", "name", "price"]));
        assert_eq!(result.data["data"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn chart_rejects_unsupported_plot_types() {
        for plot_type in ["bar", "line", "pie"] {
            let result = DisplayChartTool
                .execute(json!({"plot_type": plot_type}))
                .await
                .unwrap();
            assert!(!result.is_error(), "{plot_type} should be supported");
            assert!(result.data["labels"].is_array());
        }

        let result = DisplayChartTool
            .execute(json!({"plot_type": "scatter"}))
            .await
            .unwrap();
        assert!(result.is_error());
        assert_eq!(result.content(), "Unsupported plot type: scatter");
    }
}
